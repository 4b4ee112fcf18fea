//! Per-task ordered delivery queue
//!
//! A `Mailbox` is the sending half, cloned freely and handed to other tasks.
//! An `Inbox` is the receiving half, owned by exactly one task which drains it
//! one message at a time.
//!
//! Channels are unbounded. Observable fan-out must never wait on a slow
//! watcher and must never drop a snapshot, so a bounded `try_send` is not an
//! option here.

use sdk::errors::EngineError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create a new mailbox pair labelled for logging
pub fn mailbox<M>(label: impl Into<String>) -> (Mailbox<M>, Inbox<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let label: Arc<str> = Arc::from(label.into());

    (
        Mailbox {
            tx,
            label: Arc::clone(&label),
        },
        Inbox { rx, label },
    )
}

/// Sending half of a task's mailbox
pub struct Mailbox<M> {
    tx: mpsc::UnboundedSender<M>,
    label: Arc<str>,
}

impl<M> Mailbox<M> {
    /// Deliver a message without waiting
    ///
    /// Fails with `MailboxClosed` once the receiving task dropped or closed
    /// its inbox. Delivery order from one sender is preserved.
    pub fn send(&self, msg: M) -> Result<(), EngineError> {
        self.tx
            .send(msg)
            .map_err(|_| EngineError::MailboxClosed(self.label.to_string()))
    }

    /// Whether the receiving side still accepts messages
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Whether both handles deliver into the same inbox
    pub fn same_mailbox(&self, other: &Mailbox<M>) -> bool {
        self.tx.same_channel(&other.tx)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            label: Arc::clone(&self.label),
        }
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("label", &self.label)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Receiving half of a task's mailbox
pub struct Inbox<M> {
    rx: mpsc::UnboundedReceiver<M>,
    label: Arc<str>,
}

impl<M> Inbox<M> {
    /// Wait for the next message
    ///
    /// Returns `None` once every `Mailbox` for this inbox has been dropped
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Take the next queued message, if any, without waiting
    pub fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new messages
    ///
    /// Already queued messages can still be drained. Senders observe the
    /// mailbox as dead from this point on.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<M> fmt::Debug for Inbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox").field("label", &self.label).finish()
    }
}
