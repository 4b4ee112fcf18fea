//! Actor whose only state is one observable
//!
//! Useful for producers that have nothing else to serve: the handle forwards
//! `update` / `reset` as commands, and the actor applies them in order while
//! also answering watcher requests.

use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Observable, ObservableRef};
use crate::actor::{self, mailbox, ActorRef, Inbox, Mailbox};

enum Command<V> {
    Update(V),
    Reset,
}

/// Handle to a spawned observable actor
///
/// The actor stops once every handle clone is dropped.
pub struct ObservableActorHandle<V> {
    name: Arc<str>,
    commands: Mailbox<Command<V>>,
    observable: ObservableRef<V>,
    actor: ActorRef,
}

impl<V: Send + Sync + 'static> ObservableActorHandle<V> {
    /// Publish a value
    ///
    /// An absent value fails here with `InvalidValue`, before anything is
    /// sent to the actor.
    pub fn update(&self, value: impl Into<Option<V>>) -> Result<(), EngineError> {
        let value = value
            .into()
            .ok_or_else(|| EngineError::InvalidValue(self.name.to_string()))?;

        self.commands.send(Command::Update(value))
    }

    pub fn reset(&self) -> Result<(), EngineError> {
        self.commands.send(Command::Reset)
    }

    /// Current value, as seen after every command sent so far
    pub async fn get(&self) -> Result<Option<Arc<V>>, EngineError> {
        self.observable.get().await
    }

    pub fn observable_ref(&self) -> ObservableRef<V> {
        self.observable.clone()
    }

    pub fn actor(&self) -> &ActorRef {
        &self.actor
    }
}

impl<V> Clone for ObservableActorHandle<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            commands: self.commands.clone(),
            observable: self.observable.clone(),
            actor: self.actor.clone(),
        }
    }
}

/// Spawn an actor owning a fresh, absent observable
pub fn spawn_observable<V: Send + Sync + 'static>(
    name: impl Into<String>,
) -> ObservableActorHandle<V> {
    let name: Arc<str> = Arc::from(name.into());
    let (commands, inbox) = mailbox(format!("observable-actor:{}", name));

    let mut observable = Observable::<V>::new(name.to_string());
    let reference = observable.observable_ref();

    let handle = actor::spawn(format!("observable:{}", name), async move {
        observable.claim();
        run(observable, inbox).await
    });

    ObservableActorHandle {
        name,
        commands,
        observable: reference,
        actor: handle.actor().clone(),
    }
}

async fn run<V: Send + Sync + 'static>(
    mut observable: Observable<V>,
    mut inbox: Inbox<Command<V>>,
) {
    loop {
        tokio::select! {
            biased;

            command = inbox.recv() => match command {
                Some(Command::Update(value)) => {
                    if let Err(e) = observable.update(value) {
                        warn!("observable {} rejected update: {}", observable.name(), e);
                    }
                }
                Some(Command::Reset) => observable.reset(),
                None => break,
            },
            Some(request) = observable.next_request() => observable.handle_request(request),
        }
    }

    debug!("observable actor {} stopped", observable.name());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_then_get() {
        let handle = spawn_observable::<u32>("counter");
        assert!(handle.get().await.unwrap().is_none());

        handle.update(3).unwrap();
        assert_eq!(*handle.get().await.unwrap().unwrap(), 3);

        handle.reset().unwrap();
        assert!(handle.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_absent_fails_before_sending() {
        let handle = spawn_observable::<u32>("counter");
        handle.update(1).unwrap();

        let result = handle.update(None::<u32>);

        assert!(matches!(result, Err(EngineError::InvalidValue(name)) if name == "counter"));
        assert_eq!(*handle.get().await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_peek_leaves_no_registration() {
        let handle = spawn_observable::<u32>("counter");
        handle.update(1).unwrap();
        handle.get().await.unwrap();

        let status = handle.observable_ref().inspect().await.unwrap();
        assert!(status.ready);
        assert_eq!(status.observers, 0);
    }

    #[tokio::test]
    async fn test_actor_stops_when_handles_dropped() {
        let handle = spawn_observable::<u32>("short-lived");
        let reference = handle.observable_ref();
        let actor = handle.actor().clone();
        assert!(actor.is_alive());

        drop(handle);
        while actor.is_alive() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            reference.get().await,
            Err(EngineError::ObservableUnavailable(_))
        ));
    }
}
