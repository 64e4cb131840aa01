/*!
 * Subscriptions
 * Subscriber capability interface and registry entries
 */

use std::fmt;
use std::sync::Arc;

use super::record::{EventKind, EventRecord};
use crate::core::errors::EventResult;
use crate::core::types::SubscriptionId;

/// Subscriber notification interface
///
/// Implemented by anything that wants event deliveries: sinks, analysis
/// callbacks, policy engines. Plain closures implement it via the blanket
/// impl below.
pub trait Subscriber: Send + Sync {
    /// Deliver one record to this subscriber
    fn notify(&self, record: &EventRecord) -> EventResult<()>;
}

impl<F> Subscriber for F
where
    F: Fn(&EventRecord) -> EventResult<()> + Send + Sync,
{
    fn notify(&self, record: &EventRecord) -> EventResult<()> {
        self(record)
    }
}

/// Dispatch key filter for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindFilter {
    /// Match every event kind
    Any,
    /// Match a single event kind
    Kind(EventKind),
}

impl KindFilter {
    /// Check whether a record of the given kind matches this filter
    #[inline]
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Kind(k) => *k == kind,
        }
    }
}

impl From<EventKind> for KindFilter {
    fn from(kind: EventKind) -> Self {
        KindFilter::Kind(kind)
    }
}

/// A registered subscription, owned exclusively by the manager's registry
///
/// The handle is the only part ever returned to the caller; the filter
/// lives in the registry key, not here.
#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) subscriber: Arc<dyn Subscriber>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, subscriber: Arc<dyn Subscriber>) -> Self {
        Self { id, subscriber }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        assert!(KindFilter::Any.matches(EventKind::Breakpoint));
        assert!(KindFilter::Kind(EventKind::Breakpoint).matches(EventKind::Breakpoint));
        assert!(!KindFilter::Kind(EventKind::TaskSwitch).matches(EventKind::Breakpoint));
    }

    #[test]
    fn test_closure_subscriber() {
        let subscriber = |_record: &EventRecord| -> EventResult<()> { Ok(()) };
        let record = EventRecord::new(crate::event::record::Payload::VmReady);
        assert!(subscriber.notify(&record).is_ok());
    }
}
