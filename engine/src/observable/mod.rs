//! Observable slots of state
//!
//! An [`Observable`] is a named value owned by exactly one actor. It holds
//! either nothing ("absent") or the last published value, and keeps a
//! registry of watchers that want to hear about changes.
//!
//! # Lifecycle of a value
//!
//! - The value is absent until the first [`Observable::update`].
//! - Every `update` replaces it and notifies all watchers.
//! - [`Observable::reset`] clears it and notifies watchers with an absent
//!   message, so dependents stop acting on a stale value.
//! - `update` with an absent value is rejected with `InvalidValue`; absence is
//!   only ever reached through `reset`.
//!
//! # Delivery
//!
//! Watchers receive [`Message`]s: frozen snapshots sharing the published
//! value through an `Arc`. The owner never waits on a watcher. During each
//! fan-out every registration is re-checked: a watcher whose task has ended
//! or whose mailbox stopped accepting is removed in the same pass. That is the
//! only cleanup path, and it is never reported to the owner as an error.
//!
//! # Owning an observable inside an actor
//!
//! The owner's loop serves watcher requests next to its own commands:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         cmd = inbox.recv() => match cmd {
//!             Some(cmd) => self.handle(cmd),
//!             None => break,
//!         },
//!         Some(req) = observable.next_request() => observable.handle_request(req),
//!     }
//! }
//! ```

pub mod actor;
pub mod message;
pub mod reference;

pub use actor::{spawn_observable, ObservableActorHandle};
pub use message::{Message, ObserveHandle, Snapshot};
pub use reference::{ObservableAddress, ObservableRef, ObservableStatus, ObserveRequest};

use sdk::errors::EngineError;
use sdk::types::ObservableId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::actor::{mailbox, ActorRef, Inbox, Mailbox};

/// A named slot of state owned by one actor
pub struct Observable<V> {
    id: ObservableId,
    name: Arc<str>,
    owner: Option<ActorRef>,
    value: Option<Arc<V>>,
    observers: HashMap<ObserveHandle, Mailbox<Message>>,
    address: Mailbox<ObserveRequest>,
    requests: Inbox<ObserveRequest>,
}

impl<V: Send + Sync + 'static> Observable<V> {
    /// Create an absent observable owned by the current actor
    pub fn new(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (address, requests) = mailbox(format!("observable:{}", name));

        Self {
            id: ObservableId::next(),
            name,
            owner: ActorRef::current(),
            value: None,
            observers: HashMap::new(),
            address,
            requests,
        }
    }

    pub fn id(&self) -> ObservableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&ActorRef> {
        self.owner.as_ref()
    }

    /// Record the current actor as owner, for observables built before
    /// their owning task started
    pub(crate) fn claim(&mut self) {
        self.owner = ActorRef::current();
    }

    /// Reference other tasks use to watch this observable
    pub fn observable_ref(&self) -> ObservableRef<V> {
        ObservableRef::new(ObservableAddress::new(
            self.id,
            Arc::clone(&self.name),
            self.address.clone(),
        ))
    }

    /// Last published value, or `None` if never published or reset since
    pub fn observable_value(&self) -> Option<&Arc<V>> {
        self.value.as_ref()
    }

    /// Whether a value has been published and not reset since
    pub fn is_observable(&self) -> bool {
        self.value.is_some()
    }

    /// Number of registered watchers, live or not yet purged
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Publish a value and notify every watcher
    ///
    /// An absent value is rejected with `InvalidValue`; the current value and
    /// registry are left untouched and nobody is notified.
    pub fn update(&mut self, value: impl Into<Option<V>>) -> Result<(), EngineError> {
        let value = value
            .into()
            .ok_or_else(|| EngineError::InvalidValue(self.name.to_string()))?;

        debug!(observable = %self.name, "update");

        self.value = Some(Arc::new(value));
        self.notify();

        Ok(())
    }

    /// Clear the value and notify every watcher with an absent message
    pub fn reset(&mut self) {
        debug!(observable = %self.name, "reset");

        self.value = None;
        self.notify();
    }

    /// Register a watcher and return the current snapshot
    ///
    /// The returned message carries the value (or absence) as of now, so the
    /// watcher never depends on a later notification to see existing state.
    /// Non-persistent registrations are dropped right after this delivery.
    pub fn add_observer(
        &mut self,
        handle: ObserveHandle,
        mailbox: Mailbox<Message>,
        persistent: bool,
    ) -> Message {
        let message = self.message(handle.clone());

        if persistent {
            debug!(
                observable = %self.name,
                ready = self.is_observable(),
                "observer: {}",
                handle.describe_observer()
            );
            self.observers.insert(handle, mailbox);
        } else {
            debug!(observable = %self.name, "peek: {}", handle.describe_observer());
        }

        message
    }

    /// Drop a registration; returns whether it was present
    pub fn remove_observer(&mut self, handle: &ObserveHandle) -> bool {
        let removed = self.observers.remove(handle).is_some();
        if removed {
            debug!(observable = %self.name, "unobserve: {}", handle.describe_observer());
        }
        removed
    }

    /// Deliver the current snapshot to every live watcher
    ///
    /// Watchers whose task ended or whose mailbox no longer accepts are
    /// purged from the registry in the same pass.
    pub fn notify(&mut self) {
        let name = Arc::clone(&self.name);
        let id = self.id;
        let snapshot = self.snapshot();

        self.observers.retain(|handle, mailbox| {
            if handle.is_alive() && mailbox.is_alive() {
                let message = Message::new(handle.clone(), id, Arc::clone(&name), snapshot.clone());
                if mailbox.send(message).is_ok() {
                    debug!(observable = %name, "notify: {}", handle.describe_observer());
                    return true;
                }
            }

            debug!(observable = %name, "dead: {}", handle.describe_observer());
            false
        });
    }

    /// Wait for the next watcher request
    ///
    /// The observable holds its own request mailbox, so this never resolves
    /// to `None` while the observable exists.
    pub async fn next_request(&mut self) -> Option<ObserveRequest> {
        self.requests.recv().await
    }

    /// Apply one watcher request
    pub fn handle_request(&mut self, request: ObserveRequest) {
        match request {
            ObserveRequest::AddObserver {
                handle,
                mailbox,
                persistent,
                reply,
            } => {
                let message = self.add_observer(handle.clone(), mailbox, persistent);
                if reply.send(message).is_err() {
                    // The watcher stopped waiting for its snapshot
                    self.remove_observer(&handle);
                }
            }
            ObserveRequest::RemoveObserver { handle } => {
                self.remove_observer(&handle);
            }
            ObserveRequest::Inspect { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Apply every request already queued; returns how many were handled
    pub fn serve_pending(&mut self) -> usize {
        let mut served = 0;
        while let Some(request) = self.requests.try_recv() {
            self.handle_request(request);
            served += 1;
        }
        served
    }

    pub fn status(&self) -> ObservableStatus {
        ObservableStatus {
            id: self.id,
            name: self.name.to_string(),
            ready: self.is_observable(),
            observers: self.observers.len(),
        }
    }

    fn snapshot(&self) -> Option<Snapshot> {
        self.value
            .as_ref()
            .map(|value| Arc::clone(value) as Snapshot)
    }

    fn message(&self, handle: ObserveHandle) -> Message {
        Message::new(handle, self.id, Arc::clone(&self.name), self.snapshot())
    }
}
