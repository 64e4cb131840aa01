/*!
 * Event Module
 * Dispatch and delivery core for introspection events
 */

mod manager;
mod record;
mod subscription;
pub mod traits;

// Re-export public API
pub use manager::{DispatchReport, EventManager, EventStats, ManagerState};
pub use record::{EventKind, EventRecord, Payload, SingleStepMethod, SlpAccess};
pub use subscription::{KindFilter, Subscriber};
pub use traits::*;
