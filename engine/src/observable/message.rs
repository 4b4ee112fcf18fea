//! Observation messages and watcher registrations

use sdk::errors::EngineError;
use sdk::types::ObservableId;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::actor::ActorRef;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Frozen, shareable copy of an observable value
///
/// Type-erased so one watcher mailbox can receive from observables of
/// different value types.
pub type Snapshot = Arc<dyn Any + Send + Sync>;

/// One watcher registration
///
/// Created once per `add_observer` call and never reused. Equality and
/// hashing use the handle id only.
#[derive(Clone)]
pub struct ObserveHandle {
    id: u64,
    label: Arc<str>,
    watcher: Option<ActorRef>,
}

impl ObserveHandle {
    /// Create a handle owned by the current actor
    ///
    /// Outside a spawned actor the handle has no watcher task and its
    /// liveness is decided by the watcher's mailbox alone.
    pub fn new(label: impl Into<String>) -> Self {
        Self::build(label, ActorRef::current())
    }

    /// Create a handle owned by a specific watcher actor
    pub fn for_watcher(label: impl Into<String>, watcher: ActorRef) -> Self {
        Self::build(label, Some(watcher))
    }

    fn build(label: impl Into<String>, watcher: Option<ActorRef>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(label.into()),
            watcher,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn watcher(&self) -> Option<&ActorRef> {
        self.watcher.as_ref()
    }

    /// False once the owning watcher task has terminated
    pub fn is_alive(&self) -> bool {
        self.watcher.as_ref().map_or(true, ActorRef::is_alive)
    }

    pub fn describe_observer(&self) -> String {
        match &self.watcher {
            Some(actor) => format!("Observer<{}>@{}", self.label, actor),
            None => format!("Observer<{}>", self.label),
        }
    }
}

impl PartialEq for ObserveHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObserveHandle {}

impl Hash for ObserveHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("watcher", &self.watcher)
            .finish()
    }
}

/// Immutable snapshot of an observable delivered to one watcher
///
/// Later mutations of the observable never alter a message already built.
#[derive(Clone)]
pub struct Message {
    handle: ObserveHandle,
    observable: ObservableId,
    name: Arc<str>,
    value: Option<Snapshot>,
}

impl Message {
    pub(crate) fn new(
        handle: ObserveHandle,
        observable: ObservableId,
        name: Arc<str>,
        value: Option<Snapshot>,
    ) -> Self {
        Self {
            handle,
            observable,
            name,
            value,
        }
    }

    pub fn handle(&self) -> &ObserveHandle {
        &self.handle
    }

    pub fn observable(&self) -> ObservableId {
        self.observable
    }

    pub fn observable_name(&self) -> &str {
        &self.name
    }

    /// True when the observable had no value at the time of sending
    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.value.as_ref()
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        self.value
    }

    /// Typed view of the carried value
    pub fn value<V: Send + Sync + 'static>(&self) -> Result<Option<Arc<V>>, EngineError> {
        match &self.value {
            None => Ok(None),
            Some(snapshot) => downcast_snapshot(&self.name, snapshot).map(Some),
        }
    }

    pub fn describe_observable(&self) -> String {
        format!("Observable<{}>", self.name)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("handle", &self.handle.id)
            .field("observable", &self.observable)
            .field("name", &self.name)
            .field("absent", &self.is_absent())
            .finish()
    }
}

/// Recover the typed value from a snapshot
pub(crate) fn downcast_snapshot<V: Send + Sync + 'static>(
    observable: &str,
    snapshot: &Snapshot,
) -> Result<Arc<V>, EngineError> {
    Arc::clone(snapshot)
        .downcast::<V>()
        .map_err(|_| EngineError::SnapshotType {
            observable: observable.to_string(),
            expected: std::any::type_name::<V>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let a = ObserveHandle::new("a");
        let b = ObserveHandle::new("a");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_handle_without_watcher_is_alive() {
        let handle = ObserveHandle::new("detached");
        assert!(handle.watcher().is_none());
        assert!(handle.is_alive());
        assert_eq!(handle.describe_observer(), "Observer<detached>");
    }

    #[test]
    fn test_typed_value() {
        let snapshot: Snapshot = Arc::new(String::from("v1"));
        let msg = Message::new(
            ObserveHandle::new("t"),
            ObservableId::next(),
            Arc::from("node"),
            Some(snapshot),
        );

        let value = msg.value::<String>().unwrap().unwrap();
        assert_eq!(value.as_str(), "v1");
        assert!(matches!(
            msg.value::<u32>(),
            Err(EngineError::SnapshotType { ref observable, .. }) if observable == "node"
        ));
    }

    #[test]
    fn test_absent_message() {
        let msg = Message::new(
            ObserveHandle::new("t"),
            ObservableId::next(),
            Arc::from("node"),
            None,
        );
        assert!(msg.is_absent());
        assert!(msg.value::<String>().unwrap().is_none());
        assert_eq!(msg.describe_observable(), "Observable<node>");
    }
}
