//! Producer answering requests after a random delay

use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use sdk::errors::EngineError;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::actor::{self, mailbox, ActorHandle, Inbox, Mailbox};

/// Response to a produced request: request id and production time
#[derive(Debug, Clone, Copy)]
pub struct Produced {
    pub id: u64,
    pub at: Instant,
}

/// Where the producer delivers a response
pub enum Responder {
    /// Into the requester's mailbox
    Mailbox(Mailbox<Produced>),
    /// Straight to a waiting caller
    Signal(oneshot::Sender<Produced>),
}

impl Responder {
    fn respond(self, produced: Produced) {
        let delivered = match self {
            Responder::Mailbox(mailbox) => mailbox.send(produced).is_ok(),
            Responder::Signal(signal) => signal.send(produced).is_ok(),
        };
        if !delivered {
            debug!("requester for {} went away", produced.id);
        }
    }
}

struct Produce {
    id: u64,
    responder: Responder,
}

/// Handle to the producer actor
#[derive(Clone)]
pub struct ProducerHandle {
    mailbox: Mailbox<Produce>,
}

impl ProducerHandle {
    /// Ask for request `id` to be produced
    pub fn produce(&self, id: u64, responder: Responder) -> Result<(), EngineError> {
        self.mailbox.send(Produce { id, responder })
    }
}

/// Actor answering each request after a delay drawn from `[min, max]`
///
/// Delays run concurrently, so a slow request never holds back a fast one.
pub struct Producer {
    delay_min: Duration,
    delay_max: Duration,
    inbox: Inbox<Produce>,
}

impl Producer {
    pub fn spawn(delay_min: Duration, delay_max: Duration) -> (ProducerHandle, ActorHandle<()>) {
        let (mailbox, inbox) = mailbox("producer");
        let producer = Self {
            delay_min,
            delay_max: delay_max.max(delay_min),
            inbox,
        };

        let join = actor::spawn("producer", producer.run());
        (ProducerHandle { mailbox }, join)
    }

    fn delay(&self) -> Duration {
        let min = self.delay_min.as_micros() as u64;
        let max = self.delay_max.as_micros() as u64;
        Duration::from_micros(rand::thread_rng().gen_range(min..=max))
    }

    async fn run(mut self) {
        let mut pending = FuturesUnordered::new();

        loop {
            tokio::select! {
                request = self.inbox.recv() => match request {
                    Some(Produce { id, responder }) => {
                        let delay = self.delay();
                        pending.push(async move {
                            tokio::time::sleep(delay).await;
                            (id, responder)
                        });
                    }
                    None => break,
                },
                Some((id, responder)) = pending.next(), if !pending.is_empty() => {
                    responder.respond(Produced { id, at: Instant::now() });
                }
            }
        }

        debug!("producer stopped with {} requests outstanding", pending.len());
    }
}
