/*!
 * File Output Manager
 * Buffers delivered records in memory and persists them to disk on flush
 *
 * Records are written as self-delimiting frames (u32 LE length prefix +
 * bincode body) so a crash mid-flush can never corrupt earlier records.
 */

use log::{info, warn};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::OutputConfig;
use crate::core::errors::{EventError, EventResult};
use crate::core::limits::OUTPUT_BUFFER_INITIAL;
use crate::core::types::SubscriptionId;
use crate::event::{EventRecord, EventRegistry, KindFilter};

/// File-backed output sink
///
/// Subscribes to every event kind at construction when a store path is
/// configured; stays inert otherwise. Delivery only appends to the
/// in-memory buffer, never touches I/O, so it cannot stall the dispatch
/// path while the guest is paused.
pub struct FileOutputManager<M: EventRegistry> {
    manager: Arc<M>,
    store: Option<PathBuf>,
    buffer: Arc<Mutex<Vec<EventRecord>>>,
    subscription: Mutex<Option<SubscriptionId>>,
    // Serializes concurrent flush calls so swapped-out batches cannot
    // interleave their frames in the store
    flush_lock: Mutex<()>,
}

impl<M: EventRegistry + 'static> FileOutputManager<M> {
    /// Create a sink from the output configuration
    pub fn new(config: &OutputConfig, manager: Arc<M>) -> EventResult<Self> {
        let buffer = Arc::new(Mutex::new(Vec::with_capacity(OUTPUT_BUFFER_INITIAL)));

        let subscription = match &config.store {
            Some(path) => {
                let buf = Arc::clone(&buffer);
                let id = manager.request_event(
                    KindFilter::Any,
                    Arc::new(move |record: &EventRecord| -> EventResult<()> {
                        buf.lock().push(record.clone());
                        Ok(())
                    }),
                )?;
                info!(
                    "Output manager recording all events to {} (subscription {})",
                    path.display(),
                    id
                );
                Some(id)
            }
            None => None,
        };

        Ok(Self {
            manager,
            store: config.store.clone(),
            buffer,
            subscription: Mutex::new(subscription),
            flush_lock: Mutex::new(()),
        })
    }

    /// Number of records currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether this sink is recording
    pub fn is_recording(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Persist all buffered records to the store, in delivery order
    ///
    /// Returns the number of records written. On failure the successfully
    /// written prefix is dropped from the buffer and the rest is retained
    /// for a caller-driven retry.
    pub fn flush(&self) -> EventResult<usize> {
        let path = match &self.store {
            Some(path) => path,
            None => return Ok(0),
        };

        let _flush = self.flush_lock.lock();

        // Swap the buffer out so deliveries arriving during the write are
        // not blocked behind file I/O
        let pending = std::mem::take(&mut *self.buffer.lock());
        if pending.is_empty() {
            return Ok(0);
        }

        let mut file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => file,
            Err(e) => {
                self.requeue(pending, 0);
                return Err(EventError::PersistenceFailed(format!(
                    "cannot open {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let total = pending.len();
        let mut written = 0;
        while written < total {
            if let Err(e) = write_frame(&mut file, &pending[written]) {
                warn!(
                    "Flush stopped after {}/{} records to {}: {}",
                    written,
                    total,
                    path.display(),
                    e
                );
                self.requeue(pending, written);
                return Err(e);
            }
            written += 1;
        }

        info!("Persisted {} records to {}", total, path.display());
        Ok(total)
    }

    /// Tear the sink down: cancel the subscription, then flush
    ///
    /// Idempotent; the second and later calls are no-ops. Cancellation
    /// completes before the flush begins, so no record delivered after
    /// this call can reach the buffer.
    pub fn uninit(&self) -> EventResult<()> {
        let id = match self.subscription.lock().take() {
            Some(id) => id,
            None => return Ok(()),
        };

        if let Err(e) = self.manager.cancel_event(id) {
            warn!("Cancel of subscription {} during teardown failed: {}", id, e);
        }
        self.flush()?;
        Ok(())
    }

    /// Put the unwritten suffix of a failed flush back at the front of the
    /// buffer, ahead of anything delivered meanwhile
    fn requeue(&self, mut pending: Vec<EventRecord>, written: usize) {
        pending.drain(..written);
        let mut buffer = self.buffer.lock();
        pending.extend(buffer.drain(..));
        *buffer = pending;
    }
}

fn write_frame(file: &mut std::fs::File, record: &EventRecord) -> EventResult<()> {
    let body = bincode::serialize(record)
        .map_err(|e| EventError::PersistenceFailed(format!("serialize: {}", e)))?;
    let len = u32::try_from(body.len())
        .map_err(|_| EventError::PersistenceFailed("record exceeds frame limit".to_string()))?;

    file.write_all(&len.to_le_bytes())
        .and_then(|_| file.write_all(&body))
        .map_err(|e| EventError::PersistenceFailed(format!("write: {}", e)))
}

/// Decode every complete record frame from a persisted store
///
/// A truncated trailing frame (crash mid-flush) is ignored; all frames
/// before it decode normally.
pub fn read_records(path: impl AsRef<Path>) -> EventResult<Vec<EventRecord>> {
    let data = std::fs::read(path.as_ref())
        .map_err(|e| EventError::PersistenceFailed(format!("read: {}", e)))?;

    let mut records = Vec::new();
    let mut offset = 0usize;
    while data.len() - offset >= 4 {
        let len = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;
        if data.len() - offset < len {
            break;
        }
        let record = bincode::deserialize(&data[offset..offset + len])
            .map_err(|e| EventError::PersistenceFailed(format!("decode: {}", e)))?;
        records.push(record);
        offset += len;
    }
    Ok(records)
}
