//! Compositor joining several observables into one readiness-gated result
//!
//! An [`Observer`] subscribes to every observable of an [`ObserveSet`] and
//! keeps one slot per source. It yields the joined output only while every
//! slot holds a value:
//!
//! - Sources that are already ready at subscribe time count immediately; the
//!   first result does not wait for a change.
//! - Partial updates before readiness never yield.
//! - While ready, every further update to any slot yields exactly once.
//! - A reset of any source closes the ready window until it publishes again.
//!
//! Messages are drained from the observer's own inbox one at a time, so a
//! slot update and the result it produces are complete before the next
//! message is looked at.
//!
//! Dropping an observer revokes every registration it still holds.
//!
//! ```ignore
//! let (node, overlay) = observe(
//!     (node_ref, overlay_ref),
//!     Duration::from_secs(30),
//!     |(node, overlay)| Ok::<_, EngineError>((node.name.clone(), overlay.ip)),
//! )
//! .await?;
//! ```

pub mod set;

pub use set::{ObserveSet, Source};

use sdk::errors::EngineError;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actor::{mailbox, Inbox, Mailbox};
use crate::observable::{Message, ObserveHandle, Snapshot};

struct Slot {
    source: Source,
    handle: Option<ObserveHandle>,
    active: bool,
    value: Option<Snapshot>,
}

/// Readiness-gated join over an [`ObserveSet`]
pub struct Observer<S: ObserveSet> {
    set: S,
    label: String,
    slots: Vec<Slot>,
    by_handle: HashMap<u64, usize>,
    ready: usize,
    inbox: Inbox<Message>,
    mailbox: Option<Mailbox<Message>>,
    subscribed: bool,
    ready_at_subscribe: bool,
}

impl<S: ObserveSet> Observer<S> {
    pub fn new(set: S) -> Self {
        let sources = set.sources();
        let label = sources
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("+");

        Self::build(set, sources, label)
    }

    /// Create an observer whose registrations carry `label` in logs
    pub fn with_label(set: S, label: impl Into<String>) -> Self {
        let sources = set.sources();
        Self::build(set, sources, label.into())
    }

    fn build(set: S, sources: Vec<Source>, label: String) -> Self {
        let (mailbox, inbox) = mailbox(format!("observer:{}", label));
        let slots = sources
            .into_iter()
            .map(|source| Slot {
                source,
                handle: None,
                active: false,
                value: None,
            })
            .collect();

        Self {
            set,
            label,
            slots,
            by_handle: HashMap::new(),
            ready: 0,
            inbox,
            mailbox: Some(mailbox),
            subscribed: false,
            ready_at_subscribe: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether every slot currently holds a value
    pub fn is_ready(&self) -> bool {
        self.ready == self.slots.len()
    }

    /// Names of the slots still waiting for a value
    pub fn pending_slots(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| slot.value.is_none())
            .map(|slot| slot.source.name.clone())
            .collect()
    }

    /// Register with every source and record their current snapshots
    ///
    /// Safe to call again after being interrupted: slots already answered
    /// are kept, the others are registered anew. Fails with
    /// `ObservableUnavailable` if a source's owner is gone; registrations
    /// made so far are then revoked.
    pub async fn subscribe(&mut self) -> Result<(), EngineError> {
        if self.subscribed {
            return Ok(());
        }

        let mailbox = match &self.mailbox {
            Some(mailbox) => mailbox.clone(),
            None => return Err(EngineError::MailboxClosed(self.label.clone())),
        };

        for index in 0..self.slots.len() {
            if self.slots[index].active {
                continue;
            }

            let handle = ObserveHandle::new(format!("{}/{}", self.label, self.slots[index].source.name));
            let address = self.slots[index].source.address.clone();

            // Recorded before awaiting so an abandoned request is still revoked
            if let Some(stale) = self.slots[index].handle.replace(handle.clone()) {
                address.remove_observer(&stale);
                self.by_handle.remove(&stale.id());
            }
            self.by_handle.insert(handle.id(), index);

            match address.add_observer(handle, mailbox.clone(), true).await {
                Ok(snapshot) => {
                    self.slots[index].active = true;
                    self.apply(snapshot);
                }
                Err(e) => {
                    warn!("observer {} failed to subscribe: {}", self.label, e);
                    self.unsubscribe_all();
                    return Err(e);
                }
            }
        }

        // Only registrations keep the inbox open from here on
        self.mailbox = None;
        self.subscribed = true;
        self.ready_at_subscribe = self.is_ready();

        debug!(
            observer = %self.label,
            ready = self.ready_at_subscribe,
            "subscribed to {} observables",
            self.slots.len()
        );

        Ok(())
    }

    /// Next joined result
    ///
    /// Resolves immediately if every source was ready at subscribe time,
    /// otherwise once a message leaves every slot ready. Returns `None`
    /// once no source can send anything any more. Cancel-safe after
    /// [`Observer::subscribe`] has completed.
    pub async fn next(&mut self) -> Option<Result<S::Output, EngineError>> {
        if !self.subscribed {
            if let Err(e) = self.subscribe().await {
                return Some(Err(e));
            }
        }

        if self.ready_at_subscribe {
            self.ready_at_subscribe = false;
            return Some(self.join());
        }

        loop {
            let message = self.inbox.recv().await?;
            if self.apply(message) && self.is_ready() {
                return Some(self.join());
            }
        }
    }

    /// Wait for the first joined result, then unregister from every source
    ///
    /// On timeout every registration made by this observer is revoked before
    /// `ObserveTimeout` is returned.
    pub async fn wait(&mut self, timeout: Duration) -> Result<S::Output, EngineError> {
        let outcome = tokio::time::timeout(timeout, self.next()).await;
        self.unsubscribe_all();

        match outcome {
            Ok(Some(result)) => result,
            Ok(None) => Err(EngineError::ObservableUnavailable(
                self.pending_slots().join(", "),
            )),
            Err(_) => {
                let pending = self.pending_slots();
                info!(observer = %self.label, "timed out waiting for {:?}", pending);
                Err(EngineError::ObserveTimeout { timeout, pending })
            }
        }
    }

    /// Revoke every registration this observer holds
    pub fn unsubscribe_all(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(handle) = slot.handle.take() {
                slot.source.address.remove_observer(&handle);
            }
            slot.active = false;
        }
        self.by_handle.clear();
    }

    /// Apply one message; returns whether it belonged to a current slot
    fn apply(&mut self, message: Message) -> bool {
        let Some(&index) = self.by_handle.get(&message.handle().id()) else {
            debug!(observer = %self.label, "ignoring stale message from {}", message.describe_observable());
            return false;
        };

        let was_ready = self.is_ready();
        let slot = &mut self.slots[index];
        let had_value = slot.value.is_some();
        slot.value = message.into_snapshot();

        match (had_value, slot.value.is_some()) {
            (false, true) => self.ready += 1,
            (true, false) => self.ready -= 1,
            _ => {}
        }

        if !was_ready && self.is_ready() {
            debug!(observer = %self.label, "all observables ready");
        } else if was_ready && !self.is_ready() {
            debug!(observer = %self.label, "observable {} became absent", self.slots[index].source.name);
        }

        true
    }

    fn join(&self) -> Result<S::Output, EngineError> {
        let values: Vec<Snapshot> = self
            .slots
            .iter()
            .filter_map(|slot| slot.value.clone())
            .collect();
        self.set.join(&values)
    }
}

impl<S: ObserveSet> Drop for Observer<S> {
    fn drop(&mut self) {
        self.unsubscribe_all();
        self.inbox.close();
    }
}

/// Wait until every observable in `set` holds a value, then run `computation`
/// once on the joined values
///
/// All registrations are revoked before returning, whether the wait succeeded
/// or timed out. Errors from `computation` are returned unchanged.
pub async fn observe<S, T, E, F>(set: S, timeout: Duration, computation: F) -> Result<T, E>
where
    S: ObserveSet,
    F: FnOnce(S::Output) -> Result<T, E>,
    E: From<EngineError>,
{
    let mut observer = Observer::new(set);
    let joined = observer.wait(timeout).await?;
    computation(joined)
}

/// Run `computation` on the joined values now and after every later change
///
/// `timeout` bounds the first readiness only. Returns `Ok(())` once every
/// source's owner is gone, or the first error from `computation`.
pub async fn observe_each<S, E, F>(set: S, timeout: Duration, mut computation: F) -> Result<(), E>
where
    S: ObserveSet,
    F: FnMut(S::Output) -> Result<(), E>,
    E: From<EngineError>,
{
    let mut observer = Observer::new(set);

    let first = match tokio::time::timeout(timeout, observer.next()).await {
        Ok(Some(result)) => result?,
        Ok(None) => return Ok(()),
        Err(_) => {
            observer.unsubscribe_all();
            return Err(EngineError::ObserveTimeout {
                timeout,
                pending: observer.pending_slots(),
            }
            .into());
        }
    };
    computation(first)?;

    while let Some(joined) = observer.next().await {
        computation(joined?)?;
    }

    debug!(observer = %observer.label(), "all observables gone");
    Ok(())
}
