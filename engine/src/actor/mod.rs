//! Actor substrate for independently scheduled units of work
//!
//! Every long-lived component runs as an actor: one tokio task that owns its
//! private state and drains its own [`Inbox`] one message at a time. Nothing
//! mutable is shared between actors; they communicate only by sending
//! messages into each other's [`Mailbox`].
//!
//! # Identity and liveness
//!
//! [`spawn`] gives every task an [`ActorRef`]: a never reused id, a name for
//! logs and a liveness flag. The flag flips to dead when the task's future
//! completes, panics or is aborted, which is what lets observables recognise
//! registrations left behind by a watcher that is gone.
//!
//! [`ActorRef::current`] answers "which actor am I running in" through a
//! tokio task-local.

pub mod mailbox;

pub use mailbox::{mailbox, Inbox, Mailbox};

use sdk::errors::EngineError;
use sdk::types::ActorId;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

tokio::task_local! {
    static CURRENT_ACTOR: ActorRef;
}

/// Identity and liveness of one spawned actor task
#[derive(Clone)]
pub struct ActorRef {
    id: ActorId,
    name: Arc<str>,
    alive: Arc<AtomicBool>,
}

impl ActorRef {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActorId::next(),
            name: Arc::from(name.into()),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The actor running the current task, if it was started with [`spawn`]
    pub fn current() -> Option<ActorRef> {
        CURRENT_ACTOR.try_with(ActorRef::clone).ok()
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once the actor's task has terminated for any reason
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Marks the actor dead when the task future is dropped
struct AliveGuard {
    actor: ActorRef,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.actor.alive.store(false, Ordering::Release);
        debug!("actor {} terminated", self.actor);
    }
}

/// Handle to a spawned actor task
pub struct ActorHandle<T> {
    actor: ActorRef,
    join: JoinHandle<T>,
}

impl<T> ActorHandle<T> {
    pub fn actor(&self) -> &ActorRef {
        &self.actor
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the actor at its next suspension point
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Wait for the actor to finish
    ///
    /// Panics and cancellation inside the task surface as `ActorFailed`.
    pub async fn join(self) -> Result<T, EngineError> {
        let result = self.join.await;
        Self::outcome(&self.actor, result)
    }

    /// Wait up to `grace` for the actor to finish, aborting it otherwise
    pub async fn join_or_abort(mut self, grace: Duration) -> Result<T, EngineError> {
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(result) => Self::outcome(&self.actor, result),
            Err(_) => {
                warn!("actor {} did not stop within {:?}, aborting", self.actor, grace);
                self.join.abort();
                Err(EngineError::ActorFailed(format!(
                    "{} aborted after {:?}",
                    self.actor, grace
                )))
            }
        }
    }

    fn outcome(actor: &ActorRef, result: Result<T, JoinError>) -> Result<T, EngineError> {
        result.map_err(|e| {
            if e.is_cancelled() {
                EngineError::ActorFailed(format!("{} was cancelled", actor))
            } else {
                EngineError::ActorFailed(format!("{} panicked", actor))
            }
        })
    }
}

/// Spawn a named actor on the tokio runtime
///
/// The future runs with its [`ActorRef`] installed as the current actor.
/// Must be called from within a tokio runtime.
pub fn spawn<F>(name: impl Into<String>, future: F) -> ActorHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let actor = ActorRef::new(name);
    let guard = AliveGuard {
        actor: actor.clone(),
    };

    debug!("spawning actor {}", actor);

    let join = tokio::spawn(CURRENT_ACTOR.scope(actor.clone(), async move {
        let _guard = guard;
        future.await
    }));

    ActorHandle { actor, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_current_actor_inside_spawn() {
        assert!(ActorRef::current().is_none());

        let handle = spawn("worker", async { ActorRef::current() });
        let expected = handle.actor().clone();

        let seen = handle.join().await.unwrap().expect("current actor inside spawn");
        assert_eq!(seen, expected);
        assert_eq!(seen.name(), "worker");
    }

    #[tokio::test]
    async fn test_actor_dead_after_completion() {
        let handle = spawn("short", async { 42 });
        let actor = handle.actor().clone();

        assert_eq!(handle.join().await.unwrap(), 42);
        assert!(!actor.is_alive());
    }

    #[tokio::test]
    async fn test_actor_dead_after_abort() {
        let handle = spawn("sleeper", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let actor = handle.actor().clone();
        assert!(actor.is_alive());

        handle.abort();
        let result = handle.join().await;

        assert!(matches!(result, Err(EngineError::ActorFailed(_))));
        assert!(!actor.is_alive());
    }

    #[tokio::test]
    async fn test_join_or_abort_stragglers() {
        let quick = spawn("quick", async { 1 });
        assert_eq!(quick.join_or_abort(Duration::from_secs(1)).await.unwrap(), 1);

        let stuck = spawn("stuck", std::future::pending::<()>());
        let actor = stuck.actor().clone();
        let result = stuck.join_or_abort(Duration::from_millis(20)).await;

        assert!(matches!(result, Err(EngineError::ActorFailed(msg)) if msg.contains("aborted")));
        while actor.is_alive() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let a = spawn("a", async {});
        let b = spawn("b", async {});
        assert_ne!(a.actor(), b.actor());
        a.join().await.unwrap();
        b.join().await.unwrap();
    }
}
