/*!
 * Event Manager
 * Central dispatch engine: subscription registry, ordered delivery, lifecycle
 */

use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::record::EventRecord;
use super::subscription::{KindFilter, Subscriber, Subscription};
use super::traits::{EventDispatch, EventLifecycle, EventRegistry};
use crate::core::errors::{EventError, EventResult};
use crate::core::limits::MAX_SUBSCRIPTIONS_PER_KIND;
use crate::core::types::SubscriptionId;

/// Manager lifecycle state
///
/// Construction is the `Uninitialized -> Active` edge; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ManagerState {
    Active = 0,
    ShuttingDown = 1,
    Closed = 2,
}

impl ManagerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ManagerState::Active,
            1 => ManagerState::ShuttingDown,
            _ => ManagerState::Closed,
        }
    }
}

/// Dispatch statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStats {
    pub events_dispatched: u64,
    pub records_delivered: u64,
    pub callback_failures: u64,
    pub active_subscriptions: usize,
}

/// Outcome of one dispatch cycle
///
/// A failing subscriber never aborts the cycle; its failure is recorded
/// here and delivery continues to the remaining subscribers.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of successful deliveries
    pub delivered: usize,
    /// Per-subscriber failures, in delivery order
    pub failures: Vec<(SubscriptionId, EventError)>,
}

impl DispatchReport {
    /// True when every matched subscriber accepted the record
    #[inline]
    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-key registry entry
///
/// `order` serializes same-key dispatch so FIFO delivery holds even under
/// concurrent dispatch of the same kind. It is never held while the
/// registry itself is mutated, and `subs` is never held across a callback.
struct KindEntry {
    order: Mutex<()>,
    subs: RwLock<Vec<Subscription>>,
}

impl KindEntry {
    fn new() -> Self {
        Self {
            order: Mutex::new(()),
            subs: RwLock::new(Vec::new()),
        }
    }
}

/// Event manager implementation
///
/// # Performance
/// - Cache-line aligned to prevent false sharing of the atomic handle counter
#[repr(C, align(64))]
#[derive(Clone)]
pub struct EventManager {
    registry: Arc<DashMap<KindFilter, Arc<KindEntry>, RandomState>>,
    handles: Arc<DashMap<SubscriptionId, KindFilter, RandomState>>,
    next_id: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    stats: Arc<RwLock<EventStats>>,
}

impl EventManager {
    pub fn new() -> Self {
        info!("Event manager initialized");
        Self {
            registry: Arc::new(DashMap::with_hasher(RandomState::new())),
            handles: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            state: Arc::new(AtomicU8::new(ManagerState::Active as u8)),
            stats: Arc::new(RwLock::new(EventStats::default())),
        }
    }

    /// Register a plain callback function for the given filter
    ///
    /// Convenience over [`EventRegistry::request_event`] for closures.
    pub fn request_callback<F>(&self, filter: KindFilter, callback: F) -> EventResult<SubscriptionId>
    where
        F: Fn(&EventRecord) -> EventResult<()> + Send + Sync + 'static,
    {
        self.request_event(filter, Arc::new(callback))
    }

    /// Get dispatch statistics
    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.handles.len()
    }

    fn ensure_active(&self) -> EventResult<()> {
        match self.state() {
            ManagerState::Active => Ok(()),
            _ => Err(EventError::ManagerClosed),
        }
    }

    /// Deliver a record to every subscriber registered under one key
    ///
    /// Holds the per-key order lock for the whole invocation loop, but
    /// operates on a snapshot of the subscription list so subscribers can
    /// cancel (themselves or others) mid-delivery without deadlock.
    fn deliver_key(&self, key: KindFilter, record: &EventRecord, report: &mut DispatchReport) {
        let entry = match self.registry.get(&key) {
            Some(entry) => Arc::clone(entry.value()),
            None => return,
        };

        let _order = entry.order.lock();
        // A dispatch that raced past the state check must not start
        // delivering once teardown has begun
        if self.state() != ManagerState::Active {
            return;
        }
        let snapshot: Vec<Subscription> = entry.subs.read().clone();

        for sub in &snapshot {
            match sub.subscriber.notify(record) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Subscriber {} failed for {:?} event: {}",
                        sub.id, record.kind, e
                    );
                    let failure = match e {
                        EventError::CallbackFailed(_) => e,
                        other => EventError::CallbackFailed(other.to_string()),
                    };
                    report.failures.push((sub.id, failure));
                }
            }
        }
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry for EventManager {
    fn request_event(
        &self,
        filter: KindFilter,
        subscriber: Arc<dyn Subscriber>,
    ) -> EventResult<SubscriptionId> {
        self.ensure_active()?;

        let entry = self
            .registry
            .entry(filter)
            .or_insert_with(|| Arc::new(KindEntry::new()))
            .clone();

        let mut subs = entry.subs.write();
        if subs.len() >= MAX_SUBSCRIPTIONS_PER_KIND {
            return Err(EventError::ResourceExhausted(format!(
                "{:?} already has {} subscriptions",
                filter,
                subs.len()
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        subs.push(Subscription::new(id, subscriber));
        drop(subs);

        self.handles.insert(id, filter);
        self.stats.write().active_subscriptions += 1;

        info!("Registered subscription {} for {:?}", id, filter);
        Ok(id)
    }

    fn cancel_event(&self, id: SubscriptionId) -> EventResult<()> {
        self.ensure_active()?;

        let (_, filter) = self
            .handles
            .remove(&id)
            .ok_or(EventError::InvalidHandle(id))?;

        if let Some(entry) = self.registry.get(&filter) {
            let entry = Arc::clone(entry.value());
            entry.subs.write().retain(|sub| sub.id != id);
        }

        let mut stats = self.stats.write();
        stats.active_subscriptions = stats.active_subscriptions.saturating_sub(1);
        drop(stats);

        info!("Cancelled subscription {} for {:?}", id, filter);
        Ok(())
    }
}

impl EventDispatch for EventManager {
    fn dispatch(&self, record: &EventRecord) -> EventResult<DispatchReport> {
        self.ensure_active()?;

        debug!("Dispatching {:?} event (cpu: {:?})", record.kind, record.cpu);

        let mut report = DispatchReport::default();
        // Wildcard subscribers first, then kind-matched, each set FIFO
        self.deliver_key(KindFilter::Any, record, &mut report);
        self.deliver_key(KindFilter::Kind(record.kind), record, &mut report);

        let mut stats = self.stats.write();
        stats.events_dispatched += 1;
        stats.records_delivered += report.delivered as u64;
        stats.callback_failures += report.failures.len() as u64;
        drop(stats);

        Ok(report)
    }
}

impl EventLifecycle for EventManager {
    fn state(&self) -> ManagerState {
        ManagerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn shutdown(&self) -> EventResult<()> {
        self.state
            .compare_exchange(
                ManagerState::Active as u8,
                ManagerState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| EventError::ManagerClosed)?;

        // Drain in-flight delivery: taking each entry's order lock blocks
        // until the loop holding it finishes, and deliver_key refuses to
        // start once the state has left Active
        let entries: Vec<Arc<KindEntry>> = self
            .registry
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for entry in entries {
            let _order = entry.order.lock();
            entry.subs.write().clear();
        }

        let released = self.handles.len();
        self.registry.clear();
        self.handles.clear();
        self.stats.write().active_subscriptions = 0;

        self.state.store(ManagerState::Closed as u8, Ordering::SeqCst);
        info!("Event manager closed ({} subscriptions released)", released);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::record::{EventKind, Payload};
    use parking_lot::Mutex as PlMutex;
    use std::sync::OnceLock;

    fn breakpoint_record() -> EventRecord {
        EventRecord::new(Payload::Breakpoint {
            gva: 0x1000,
            gpa: 0x2000,
        })
        .with_cpu(0)
    }

    #[test]
    fn test_registration_order_preserved() {
        let manager = EventManager::new();
        let order = Arc::new(PlMutex::new(Vec::new()));

        for tag in 0..4u32 {
            let order = Arc::clone(&order);
            manager
                .request_callback(KindFilter::Kind(EventKind::Breakpoint), move |_| {
                    order.lock().push(tag);
                    Ok(())
                })
                .unwrap();
        }

        manager.dispatch(&breakpoint_record()).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_wildcard_delivered_before_kind() {
        let manager = EventManager::new();
        let order = Arc::new(PlMutex::new(Vec::new()));

        let o = Arc::clone(&order);
        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), move |_| {
                o.lock().push("kind");
                Ok(())
            })
            .unwrap();

        let o = Arc::clone(&order);
        manager
            .request_callback(KindFilter::Any, move |_| {
                o.lock().push("any");
                Ok(())
            })
            .unwrap();

        manager.dispatch(&breakpoint_record()).unwrap();
        assert_eq!(*order.lock(), vec!["any", "kind"]);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let manager = EventManager::new();
        let count = Arc::new(PlMutex::new(0usize));

        let c = Arc::clone(&count);
        let id = manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), move |_| {
                *c.lock() += 1;
                Ok(())
            })
            .unwrap();

        manager.dispatch(&breakpoint_record()).unwrap();
        manager.cancel_event(id).unwrap();
        manager.dispatch(&breakpoint_record()).unwrap();

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_double_cancel_is_invalid_handle() {
        let manager = EventManager::new();
        let id = manager
            .request_callback(KindFilter::Any, |_| Ok(()))
            .unwrap();

        manager.cancel_event(id).unwrap();
        assert_eq!(
            manager.cancel_event(id),
            Err(EventError::InvalidHandle(id))
        );
    }

    #[test]
    fn test_self_cancel_during_dispatch() {
        let manager = EventManager::new();
        let handle: Arc<OnceLock<SubscriptionId>> = Arc::new(OnceLock::new());
        let count = Arc::new(PlMutex::new(0usize));

        let m = manager.clone();
        let h = Arc::clone(&handle);
        let c = Arc::clone(&count);
        let id = manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), move |_| {
                *c.lock() += 1;
                m.cancel_event(*h.get().unwrap())?;
                Ok(())
            })
            .unwrap();
        handle.set(id).unwrap();

        manager.dispatch(&breakpoint_record()).unwrap();
        manager.dispatch(&breakpoint_record()).unwrap();

        // Delivered exactly once: the currently executing call completes,
        // cancellation is effective for the next cycle
        assert_eq!(*count.lock(), 1);
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_failing_subscriber_does_not_abort_dispatch() {
        let manager = EventManager::new();
        let reached = Arc::new(PlMutex::new(false));

        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), |_| {
                Err(EventError::CallbackFailed("synthetic failure".to_string()))
            })
            .unwrap();

        let r = Arc::clone(&reached);
        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), move |_| {
                *r.lock() = true;
                Ok(())
            })
            .unwrap();

        let report = manager.dispatch(&breakpoint_record()).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(*reached.lock());
    }

    #[test]
    fn test_callback_failure_reported_verbatim() {
        let manager = EventManager::new();
        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), |_| {
                Err(EventError::CallbackFailed("sensor offline".to_string()))
            })
            .unwrap();

        let report = manager.dispatch(&breakpoint_record()).unwrap();
        assert_eq!(
            report.failures[0].1,
            EventError::CallbackFailed("sensor offline".to_string())
        );
    }

    #[test]
    fn test_other_failures_wrapped_as_callback_failed() {
        let manager = EventManager::new();
        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), |_| {
                Err(EventError::InvalidState("vcpu not paused".to_string()))
            })
            .unwrap();

        let report = manager.dispatch(&breakpoint_record()).unwrap();
        match &report.failures[0].1 {
            EventError::CallbackFailed(msg) => assert!(msg.contains("vcpu not paused")),
            other => panic!("expected CallbackFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_lifecycle() {
        let manager = EventManager::new();
        assert_eq!(manager.state(), ManagerState::Active);

        manager
            .request_callback(KindFilter::Any, |_| Ok(()))
            .unwrap();

        manager.shutdown().unwrap();
        assert_eq!(manager.state(), ManagerState::Closed);
        assert_eq!(manager.subscription_count(), 0);

        assert_eq!(
            manager.dispatch(&breakpoint_record()).unwrap_err(),
            EventError::ManagerClosed
        );
        assert_eq!(
            manager.request_callback(KindFilter::Any, |_| Ok(())),
            Err(EventError::ManagerClosed)
        );
        assert_eq!(manager.shutdown(), Err(EventError::ManagerClosed));
    }

    #[test]
    fn test_stats_tracking() {
        let manager = EventManager::new();
        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), |_| Ok(()))
            .unwrap();
        manager
            .request_callback(KindFilter::Kind(EventKind::Breakpoint), |_| {
                Err(EventError::CallbackFailed("boom".to_string()))
            })
            .unwrap();

        manager.dispatch(&breakpoint_record()).unwrap();

        let stats = manager.stats();
        assert_eq!(stats.events_dispatched, 1);
        assert_eq!(stats.records_delivered, 1);
        assert_eq!(stats.callback_failures, 1);
        assert_eq!(stats.active_subscriptions, 2);
    }
}
