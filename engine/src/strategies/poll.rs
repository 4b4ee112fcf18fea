//! Poll-wait strategy
//!
//! Responses land in a table; outstanding requests check the table on every
//! tick of a fixed interval. Latency is bounded below by the interval.

use sdk::errors::EngineError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::producer::{Produced, ProducerHandle, Responder};
use super::{Reply, WaiterHandle, WaiterMessage};
use crate::actor::{self, mailbox, ActorHandle, Inbox, Mailbox};

struct Outstanding {
    reply: Reply,
    deadline: Instant,
}

pub struct PollWaiter {
    producer: ProducerHandle,
    interval: Duration,
    timeout: Duration,
    inbox: Inbox<WaiterMessage>,
    responses_to: Mailbox<Produced>,
    responses: Inbox<Produced>,
    arrived: HashMap<u64, Instant>,
    outstanding: HashMap<u64, Outstanding>,
    polls: u64,
}

impl PollWaiter {
    pub fn spawn(
        producer: ProducerHandle,
        interval: Duration,
        timeout: Duration,
    ) -> (WaiterHandle, ActorHandle<()>) {
        let (handle, inbox) = mailbox("poll_waiter");
        let (responses_to, responses) = mailbox("poll_waiter:responses");

        let waiter = Self {
            producer,
            interval,
            timeout,
            inbox,
            responses_to,
            responses,
            arrived: HashMap::new(),
            outstanding: HashMap::new(),
            polls: 0,
        };

        let join = actor::spawn("poll_waiter", waiter.run());
        (WaiterHandle::new(handle), join)
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(WaiterMessage::Request { id, reply }) => self.request(id, reply),
                    Some(WaiterMessage::Ping { sent, reply }) => {
                        let _ = reply.send(sent.elapsed());
                    }
                    None => break,
                },
                Some(produced) = self.responses.recv() => self.arrive(produced),
                _ = ticker.tick() => self.poll(),
            }
        }

        debug!("poll waiter stopped after {} polls", self.polls);
    }

    fn request(&mut self, id: u64, reply: Reply) {
        if let Err(e) = self
            .producer
            .produce(id, Responder::Mailbox(self.responses_to.clone()))
        {
            let _ = reply.send(Err(e));
            return;
        }

        self.outstanding.insert(
            id,
            Outstanding {
                reply,
                deadline: Instant::now() + self.timeout,
            },
        );
    }

    /// Record a response for the next poll; late ones are dropped
    fn arrive(&mut self, produced: Produced) {
        if self.outstanding.contains_key(&produced.id) {
            self.arrived.insert(produced.id, produced.at);
        } else {
            debug!("late response for request-{}", produced.id);
        }
    }

    fn poll(&mut self) {
        let now = Instant::now();
        let ids: Vec<u64> = self.outstanding.keys().copied().collect();

        for id in ids {
            self.polls += 1;

            if let Some(at) = self.arrived.remove(&id) {
                if let Some(outstanding) = self.outstanding.remove(&id) {
                    let _ = outstanding.reply.send(Ok(now.duration_since(at)));
                }
            } else if self
                .outstanding
                .get(&id)
                .is_some_and(|outstanding| outstanding.deadline <= now)
            {
                if let Some(outstanding) = self.outstanding.remove(&id) {
                    let _ = outstanding.reply.send(Err(EngineError::ObserveTimeout {
                        timeout: self.timeout,
                        pending: vec![format!("request-{}", id)],
                    }));
                }
            }
        }
    }
}
