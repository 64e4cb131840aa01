/*!
 * Event Records
 * Strongly-typed introspection events with monotonic timestamps
 */

use crate::core::types::{CpuNum, GuestPhysAddr, GuestVirtAddr, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Event category used as the dispatch key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    /// VM is ready to run, last chance to set up callbacks
    VmReady,
    /// VM was paused
    VmStop,
    /// VM finished execution and is about to be destroyed
    VmShutdown,
    /// A breakpoint was hit within the guest
    Breakpoint,
    /// A single step completed
    SingleStep,
    /// The guest switched address spaces
    TaskSwitch,
    /// A second-level paging violation occurred
    SlpViolation,
    /// A trapped register was written
    RegisterWrite,
    /// A trapped memory region was accessed
    MemoryAccess,
}

/// Single stepping mechanism used by the hypervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SingleStepMethod {
    /// Hardware debug exception
    Debug,
    /// Monitor trap flag
    Mtf,
}

/// Access bits of a second-level paging violation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlpAccess {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// Event payload - strongly typed variants for each event kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    VmReady,
    VmStop,
    VmShutdown,
    Breakpoint {
        gva: GuestVirtAddr,
        gpa: GuestPhysAddr,
    },
    SingleStep {
        method: SingleStepMethod,
    },
    TaskSwitch {
        incoming_dtb: u64,
        outgoing_dtb: u64,
    },
    SlpViolation {
        gva: Option<GuestVirtAddr>,
        gpa: GuestPhysAddr,
        access: SlpAccess,
    },
    RegisterWrite {
        register: String,
        value: u64,
    },
    MemoryAccess {
        gva: GuestVirtAddr,
        gpa: GuestPhysAddr,
        size: usize,
        write: bool,
    },
}

impl Payload {
    /// Dispatch key for this payload
    #[inline]
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::VmReady => EventKind::VmReady,
            Payload::VmStop => EventKind::VmStop,
            Payload::VmShutdown => EventKind::VmShutdown,
            Payload::Breakpoint { .. } => EventKind::Breakpoint,
            Payload::SingleStep { .. } => EventKind::SingleStep,
            Payload::TaskSwitch { .. } => EventKind::TaskSwitch,
            Payload::SlpViolation { .. } => EventKind::SlpViolation,
            Payload::RegisterWrite { .. } => EventKind::RegisterWrite,
            Payload::MemoryAccess { .. } => EventKind::MemoryAccess,
        }
    }
}

/// One intercepted occurrence, immutable once constructed
///
/// Records are owned by the manager during dispatch; subscribers receive
/// a borrowed view and must clone if they need the record past the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Dispatch key, always derived from the payload
    pub kind: EventKind,
    /// Monotonic timestamp (nanoseconds since engine start)
    pub timestamp_ns: Timestamp,
    /// Virtual CPU the occurrence was reported on, if CPU-bound
    pub cpu: Option<CpuNum>,
    /// Event payload
    pub payload: Payload,
}

impl EventRecord {
    /// Create a new record with the current timestamp
    #[inline]
    pub fn new(payload: Payload) -> Self {
        Self {
            kind: payload.kind(),
            timestamp_ns: Self::now_ns(),
            cpu: None,
            payload,
        }
    }

    /// Attach the reporting CPU
    #[inline]
    pub fn with_cpu(mut self, cpu: CpuNum) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Current time in nanoseconds (monotonic)
    #[inline]
    fn now_ns() -> Timestamp {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}
