//! Cross-task addressing of observables
//!
//! An observable lives inside its owner's task. Other tasks reach it through
//! an [`ObservableRef`], which only ever sends [`ObserveRequest`]s into the
//! observable's request mailbox; the owner applies them from its own loop.

use sdk::errors::EngineError;
use sdk::types::ObservableId;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use super::message::{downcast_snapshot, Message, ObserveHandle};
use crate::actor::{mailbox, Mailbox};

/// Requests served by an observable's owner
pub enum ObserveRequest {
    /// Register a watcher and reply with the current snapshot
    AddObserver {
        handle: ObserveHandle,
        mailbox: Mailbox<Message>,
        persistent: bool,
        reply: oneshot::Sender<Message>,
    },
    /// Drop a registration, if still present
    RemoveObserver { handle: ObserveHandle },
    /// Report the observable's current status
    Inspect {
        reply: oneshot::Sender<ObservableStatus>,
    },
}

impl fmt::Debug for ObserveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddObserver {
                handle, persistent, ..
            } => f
                .debug_struct("AddObserver")
                .field("handle", &handle.id())
                .field("persistent", persistent)
                .finish(),
            Self::RemoveObserver { handle } => f
                .debug_struct("RemoveObserver")
                .field("handle", &handle.id())
                .finish(),
            Self::Inspect { .. } => f.write_str("Inspect"),
        }
    }
}

/// Point-in-time status of an observable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservableStatus {
    pub id: ObservableId,
    pub name: String,
    pub ready: bool,
    pub observers: usize,
}

/// Untyped address of an observable
#[derive(Clone)]
pub struct ObservableAddress {
    id: ObservableId,
    name: Arc<str>,
    requests: Mailbox<ObserveRequest>,
}

impl ObservableAddress {
    pub(crate) fn new(id: ObservableId, name: Arc<str>, requests: Mailbox<ObserveRequest>) -> Self {
        Self { id, name, requests }
    }

    pub fn id(&self) -> ObservableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the owner still accepts requests
    pub fn is_alive(&self) -> bool {
        self.requests.is_alive()
    }

    /// Register a watcher mailbox and return the current snapshot
    ///
    /// Fails with `ObservableUnavailable` if the owning task is gone.
    pub async fn add_observer(
        &self,
        handle: ObserveHandle,
        mailbox: Mailbox<Message>,
        persistent: bool,
    ) -> Result<Message, EngineError> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(ObserveRequest::AddObserver {
                handle,
                mailbox,
                persistent,
                reply,
            })
            .map_err(|_| self.unavailable())?;

        response.await.map_err(|_| self.unavailable())
    }

    /// Unregister a watcher without waiting
    ///
    /// Requests from one sender are applied in order, so the removal takes
    /// effect before anything this task sends to the observable afterwards.
    pub fn remove_observer(&self, handle: &ObserveHandle) {
        if self
            .requests
            .send(ObserveRequest::RemoveObserver {
                handle: handle.clone(),
            })
            .is_err()
        {
            debug!("observable {} gone, nothing to unregister", self.name);
        }
    }

    pub async fn inspect(&self) -> Result<ObservableStatus, EngineError> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(ObserveRequest::Inspect { reply })
            .map_err(|_| self.unavailable())?;

        response.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> EngineError {
        EngineError::ObservableUnavailable(self.name.to_string())
    }
}

impl fmt::Debug for ObservableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableAddress")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Typed, cloneable reference to an observable owned by another task
pub struct ObservableRef<V> {
    address: ObservableAddress,
    _value: PhantomData<fn() -> V>,
}

impl<V: Send + Sync + 'static> ObservableRef<V> {
    pub(crate) fn new(address: ObservableAddress) -> Self {
        Self {
            address,
            _value: PhantomData,
        }
    }

    pub fn id(&self) -> ObservableId {
        self.address.id()
    }

    pub fn name(&self) -> &str {
        self.address.name()
    }

    pub fn address(&self) -> &ObservableAddress {
        &self.address
    }

    pub async fn add_observer(
        &self,
        handle: ObserveHandle,
        mailbox: Mailbox<Message>,
        persistent: bool,
    ) -> Result<Message, EngineError> {
        self.address.add_observer(handle, mailbox, persistent).await
    }

    pub fn remove_observer(&self, handle: &ObserveHandle) {
        self.address.remove_observer(handle)
    }

    pub async fn inspect(&self) -> Result<ObservableStatus, EngineError> {
        self.address.inspect().await
    }

    /// One-shot peek at the current value
    ///
    /// Registers non-persistently, so the observable keeps no registration
    /// after answering.
    pub async fn get(&self) -> Result<Option<Arc<V>>, EngineError> {
        let (peek, _inbox) = mailbox::<Message>(format!("peek:{}", self.name()));
        let handle = ObserveHandle::new(format!("peek:{}", self.name()));

        let message = self.address.add_observer(handle, peek, false).await?;

        match message.snapshot() {
            None => Ok(None),
            Some(snapshot) => downcast_snapshot(self.name(), snapshot).map(Some),
        }
    }
}

impl<V> Clone for ObservableRef<V> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for ObservableRef<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObservableRef").field(&self.address).finish()
    }
}
