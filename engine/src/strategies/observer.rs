//! Observable/Observer strategy
//!
//! Each request gets its own observable. The waiter subscribes and goes back
//! to its mailbox; a response only updates the observable, and the pending
//! observe completes from the waiter's own loop.

use futures::stream::{FuturesUnordered, StreamExt};
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::producer::{Produced, ProducerHandle, Responder};
use super::{WaiterHandle, WaiterMessage};
use crate::actor::{self, mailbox, ActorHandle, Inbox, Mailbox};
use crate::observable::{spawn_observable, ObservableActorHandle};
use crate::observer::observe;

pub struct ObserverWaiter {
    producer: ProducerHandle,
    timeout: Duration,
    inbox: Inbox<WaiterMessage>,
    responses_to: Mailbox<Produced>,
    responses: Inbox<Produced>,
    requests: HashMap<u64, ObservableActorHandle<Instant>>,
}

impl ObserverWaiter {
    pub fn spawn(producer: ProducerHandle, timeout: Duration) -> (WaiterHandle, ActorHandle<()>) {
        let (handle, inbox) = mailbox("observer_waiter");
        let (responses_to, responses) = mailbox("observer_waiter:responses");

        let waiter = Self {
            producer,
            timeout,
            inbox,
            responses_to,
            responses,
            requests: HashMap::new(),
        };

        let join = actor::spawn("observer_waiter", waiter.run());
        (WaiterHandle::new(handle), join)
    }

    async fn run(mut self) {
        let mut observing = FuturesUnordered::new();

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(WaiterMessage::Request { id, reply }) => {
                        let request = spawn_observable::<Instant>(format!("request-{}", id));

                        if let Err(e) = self
                            .producer
                            .produce(id, Responder::Mailbox(self.responses_to.clone()))
                        {
                            let _ = reply.send(Err(e));
                            continue;
                        }

                        let watched = request.observable_ref();
                        let timeout = self.timeout;
                        self.requests.insert(id, request);

                        observing.push(async move {
                            let result = observe(watched, timeout, |at: Arc<Instant>| {
                                Ok::<_, EngineError>(at.elapsed())
                            })
                            .await;
                            (id, reply, result)
                        });
                    }
                    Some(WaiterMessage::Ping { sent, reply }) => {
                        let _ = reply.send(sent.elapsed());
                    }
                    None => break,
                },
                Some(produced) = self.responses.recv() => {
                    match self.requests.get(&produced.id) {
                        Some(request) => {
                            if let Err(e) = request.update(produced.at) {
                                warn!("request-{} not updated: {}", produced.id, e);
                            }
                        }
                        None => debug!("late response for request-{}", produced.id),
                    }
                }
                Some((id, reply, result)) = observing.next(), if !observing.is_empty() => {
                    self.requests.remove(&id);
                    let _ = reply.send(result);
                }
            }
        }

        debug!("observer waiter stopped");
    }
}
