/*!
 * Event Traits
 * Dispatch engine abstractions
 */

use std::sync::Arc;

use super::manager::{DispatchReport, ManagerState};
use super::record::EventRecord;
use super::subscription::{KindFilter, Subscriber};
use crate::core::errors::EventResult;
use crate::core::types::SubscriptionId;

/// Subscription registry interface
pub trait EventRegistry: Send + Sync {
    /// Register a subscriber for the given filter, returning its handle
    fn request_event(
        &self,
        filter: KindFilter,
        subscriber: Arc<dyn Subscriber>,
    ) -> EventResult<SubscriptionId>;

    /// Cancel a subscription by handle
    fn cancel_event(&self, id: SubscriptionId) -> EventResult<()>;
}

/// Event dispatch interface, driven by the hypervisor-facing layer
pub trait EventDispatch: Send + Sync {
    /// Deliver a record to all matching subscribers in registration order
    fn dispatch(&self, record: &EventRecord) -> EventResult<DispatchReport>;
}

/// Lifecycle management interface
pub trait EventLifecycle: Send + Sync {
    /// Current lifecycle state
    fn state(&self) -> ManagerState;

    /// Tear down the manager, releasing all subscriptions
    fn shutdown(&self) -> EventResult<()>;
}

/// Combined engine trait
pub trait EventService: EventRegistry + EventDispatch + EventLifecycle {}

/// Implement EventService for types that implement all required traits
impl<T> EventService for T where T: EventRegistry + EventDispatch + EventLifecycle {}
