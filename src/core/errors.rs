/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::SubscriptionId;

/// Result type for engine operations
pub type EventResult<T> = Result<T, EventError>;

/// Event engine errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum EventError {
    #[error("Subscription capacity reached: {0}")]
    #[diagnostic(
        code(event::resource_exhausted),
        help("Cancel unused subscriptions before registering new ones.")
    )]
    ResourceExhausted(String),

    #[error("Unknown or already-cancelled handle: {0}")]
    #[diagnostic(
        code(event::invalid_handle),
        help("Handles are single-use; a cancelled handle is permanently invalid.")
    )]
    InvalidHandle(SubscriptionId),

    #[error("Subscriber callback failed: {0}")]
    #[diagnostic(
        code(event::callback_failed),
        help("Delivery continues to the remaining subscribers. Check the subscriber's own logs.")
    )]
    CallbackFailed(String),

    #[error("Event manager is closed")]
    #[diagnostic(
        code(event::manager_closed),
        help("Registration, cancellation, and dispatch are only valid while the manager is active.")
    )]
    ManagerClosed,

    #[error("Invalid manager state: {0}")]
    #[diagnostic(
        code(event::invalid_state),
        help("Operation cannot be performed in the current lifecycle state.")
    )]
    InvalidState(String),

    #[error("Failed to persist records: {0}")]
    #[diagnostic(
        code(event::persistence_failed),
        help("Unwritten records stay buffered; retry flush after resolving the I/O problem.")
    )]
    PersistenceFailed(String),
}
