//! Condition-signal strategy
//!
//! Each request blocks the waiter until the producer signals it directly.
//! Nothing else in the waiter's mailbox is looked at meanwhile.

use sdk::errors::EngineError;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use super::producer::{ProducerHandle, Responder};
use super::{WaiterHandle, WaiterMessage};
use crate::actor::{self, mailbox, ActorHandle, Inbox};

pub struct ConditionWaiter {
    producer: ProducerHandle,
    timeout: Duration,
    inbox: Inbox<WaiterMessage>,
}

impl ConditionWaiter {
    pub fn spawn(producer: ProducerHandle, timeout: Duration) -> (WaiterHandle, ActorHandle<()>) {
        let (handle, inbox) = mailbox("condition_waiter");
        let waiter = Self {
            producer,
            timeout,
            inbox,
        };

        let join = actor::spawn("condition_waiter", waiter.run());
        (WaiterHandle::new(handle), join)
    }

    async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            match message {
                WaiterMessage::Request { id, reply } => {
                    let _ = reply.send(self.request(id).await);
                }
                WaiterMessage::Ping { sent, reply } => {
                    let _ = reply.send(sent.elapsed());
                }
            }
        }

        debug!("condition waiter stopped");
    }

    async fn request(&self, id: u64) -> Result<Duration, EngineError> {
        let (signal, condition) = oneshot::channel();
        self.producer.produce(id, Responder::Signal(signal))?;

        match tokio::time::timeout(self.timeout, condition).await {
            Ok(Ok(produced)) => Ok(produced.at.elapsed()),
            Ok(Err(_)) => Err(EngineError::ActorFailed(format!(
                "producer dropped request {}",
                id
            ))),
            Err(_) => Err(EngineError::ObserveTimeout {
                timeout: self.timeout,
                pending: vec![format!("request-{}", id)],
            }),
        }
    }
}
