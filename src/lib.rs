/*!
 * VMI Event Engine Library
 * Event dispatch and delivery core for virtual-machine introspection
 */

pub mod config;
pub mod core;
pub mod event;
pub mod output;

// Re-exports
pub use crate::config::{Config, ConfigError, OutputConfig};
pub use crate::core::errors::{EventError, EventResult};
pub use crate::core::types::{CpuNum, SubscriptionId};
pub use crate::event::{
    DispatchReport, EventDispatch, EventKind, EventLifecycle, EventManager, EventRecord,
    EventRegistry, EventService, EventStats, KindFilter, ManagerState, Payload, SingleStepMethod,
    SlpAccess, Subscriber,
};
pub use crate::output::{read_records, FileOutputManager};
