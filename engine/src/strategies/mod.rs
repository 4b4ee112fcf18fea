//! Scheduling strategies for "wait until another task has produced a value"
//!
//! Three waiters built on the same actor and mailbox substrate, all served by
//! one [`Producer`] that answers after a random delay:
//!
//! - [`PollWaiter`] checks for a response on a fixed interval.
//! - [`ConditionWaiter`] blocks on a signal from the producer, occupying its
//!   task for the whole wait.
//! - [`ObserverWaiter`] observes a per-request observable and keeps serving
//!   its mailbox while waiting.
//!
//! [`run_strategy`] fires many concurrent requests at one waiter, interleaved
//! with pings that measure how long unrelated mailbox work is held up.

pub mod condition;
pub mod observer;
pub mod poll;
pub mod producer;

pub use condition::ConditionWaiter;
pub use observer::ObserverWaiter;
pub use poll::PollWaiter;
pub use producer::{Producer, ProducerHandle};

use futures::future::join_all;
use sdk::errors::EngineError;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::actor::{ActorHandle, Mailbox};
use crate::config::BenchConfig;

/// Pause between issuing two requests
const ISSUE_INTERVAL: Duration = Duration::from_millis(1);

pub type Reply = oneshot::Sender<Result<Duration, EngineError>>;

/// Messages every waiter understands
pub enum WaiterMessage {
    /// Wait for request `id`; reply with the response latency
    Request { id: u64, reply: Reply },
    /// Unrelated work; reply with how long the ping sat in the mailbox
    Ping {
        sent: Instant,
        reply: oneshot::Sender<Duration>,
    },
}

/// Handle to any waiter actor
#[derive(Clone)]
pub struct WaiterHandle {
    mailbox: Mailbox<WaiterMessage>,
}

impl WaiterHandle {
    pub(crate) fn new(mailbox: Mailbox<WaiterMessage>) -> Self {
        Self { mailbox }
    }

    /// Send request `id` now; the returned future resolves with its latency
    pub fn request(&self, id: u64) -> impl Future<Output = Result<Duration, EngineError>> + Send {
        let (reply, response) = oneshot::channel();
        let sent = self.mailbox.send(WaiterMessage::Request { id, reply });

        async move {
            sent?;
            response
                .await
                .map_err(|_| EngineError::ActorFailed(format!("waiter dropped request {}", id)))?
        }
    }

    /// Send a ping now; the returned future resolves with its queueing delay
    pub fn ping(&self) -> impl Future<Output = Result<Duration, EngineError>> + Send {
        let (reply, response) = oneshot::channel();
        let sent = self.mailbox.send(WaiterMessage::Ping {
            sent: Instant::now(),
            reply,
        });

        async move {
            sent?;
            response
                .await
                .map_err(|_| EngineError::ActorFailed("waiter dropped ping".to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Poll,
    Condition,
    Observer,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Poll,
        StrategyKind::Condition,
        StrategyKind::Observer,
    ];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Poll => "poll",
            StrategyKind::Condition => "condition",
            StrategyKind::Observer => "observer",
        };
        f.write_str(name)
    }
}

/// Outcome of one strategy run, latencies in milliseconds
#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategy: StrategyKind,
    pub requests: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_latency_ms: f64,
    pub mean_latency_ms: f64,
    pub max_latency_ms: f64,
    pub pings: usize,
    pub mean_ping_ms: f64,
    pub max_ping_ms: f64,
    pub elapsed_ms: f64,
}

impl StrategyReport {
    fn new(
        strategy: StrategyKind,
        requests: usize,
        latencies: &[Duration],
        pings: &[Duration],
        elapsed: Duration,
    ) -> Self {
        Self {
            strategy,
            requests,
            completed: latencies.len(),
            failed: requests - latencies.len(),
            total_latency_ms: millis(latencies.iter().sum()),
            mean_latency_ms: mean_ms(latencies),
            max_latency_ms: max_ms(latencies),
            pings: pings.len(),
            mean_ping_ms: mean_ms(pings),
            max_ping_ms: max_ms(pings),
            elapsed_ms: millis(elapsed),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn mean_ms(samples: &[Duration]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    millis(samples.iter().sum()) / samples.len() as f64
}

fn max_ms(samples: &[Duration]) -> f64 {
    samples.iter().max().copied().map(millis).unwrap_or(0.0)
}

/// Spawn a producer and a waiter of the given kind
pub fn spawn_waiter(
    kind: StrategyKind,
    config: &BenchConfig,
) -> (WaiterHandle, Vec<ActorHandle<()>>) {
    let (producer, producer_actor) = Producer::spawn(config.delay_min(), config.delay_max());

    let (waiter, waiter_actor) = match kind {
        StrategyKind::Poll => PollWaiter::spawn(producer, config.poll_interval(), config.timeout()),
        StrategyKind::Condition => ConditionWaiter::spawn(producer, config.timeout()),
        StrategyKind::Observer => ObserverWaiter::spawn(producer, config.timeout()),
    };

    (waiter, vec![waiter_actor, producer_actor])
}

/// Issue `config.requests` concurrent requests against one waiter
pub async fn run_strategy(
    kind: StrategyKind,
    config: &BenchConfig,
) -> Result<StrategyReport, EngineError> {
    info!("running {} strategy with {} requests", kind, config.requests);

    let started = Instant::now();
    let (waiter, actors) = spawn_waiter(kind, config);

    let mut requests = Vec::with_capacity(config.requests);
    let mut pings = Vec::new();
    for id in 0..config.requests as u64 {
        requests.push(waiter.request(id));
        if (id as usize + 1) % config.ping_every.max(1) == 0 {
            pings.push(waiter.ping());
        }
        tokio::time::sleep(ISSUE_INTERVAL).await;
    }

    let (requests, pings) = tokio::join!(join_all(requests), join_all(pings));

    let mut latencies = Vec::with_capacity(requests.len());
    for (id, result) in requests.into_iter().enumerate() {
        match result {
            Ok(latency) => latencies.push(latency),
            Err(e) => debug!("{} request {} failed: {}", kind, id, e),
        }
    }
    let pings = pings.into_iter().collect::<Result<Vec<_>, _>>()?;

    drop(waiter);
    for actor in actors {
        actor.join().await?;
    }

    let report = StrategyReport::new(kind, config.requests, &latencies, &pings, started.elapsed());
    info!(
        "{}: {}/{} completed, mean latency {:.3}ms, max ping {:.3}ms",
        kind, report.completed, report.requests, report.mean_latency_ms, report.max_ping_ms
    );

    Ok(report)
}
