//! Integration tests for the wait-strategy harness
//!
//! Each strategy runs the same small workload against its own producer.
//! Assertions compare strategies only where the gap is structural: the poll
//! waiter notices a response up to one interval late, and the condition
//! waiter leaves pings queued behind every blocked request.

use beacon_engine::config::BenchConfig;
use beacon_engine::strategies::{run_strategy, spawn_waiter, StrategyKind};
use std::time::Duration;

fn small_bench() -> BenchConfig {
    BenchConfig {
        requests: 20,
        delay_min_ms: 20,
        delay_max_ms: 40,
        poll_interval_ms: 50,
        timeout_secs: 5,
        ping_every: 5,
    }
}

#[tokio::test]
async fn test_every_strategy_completes_all_requests() {
    let config = small_bench();

    for kind in StrategyKind::ALL {
        let report = run_strategy(kind, &config).await.unwrap();
        assert_eq!(report.strategy, kind);
        assert_eq!(report.completed, config.requests, "{} dropped requests", kind);
        assert_eq!(report.failed, 0);
        assert_eq!(report.pings, config.requests / config.ping_every);
    }
}

#[tokio::test]
async fn test_observer_reacts_sooner_than_polling() {
    let config = small_bench();

    let poll = run_strategy(StrategyKind::Poll, &config).await.unwrap();
    let observer = run_strategy(StrategyKind::Observer, &config).await.unwrap();

    assert!(
        observer.mean_latency_ms <= poll.mean_latency_ms,
        "observer {:.3}ms vs poll {:.3}ms",
        observer.mean_latency_ms,
        poll.mean_latency_ms
    );
}

#[tokio::test]
async fn test_condition_waiter_holds_up_pings() {
    let config = small_bench();

    let condition = run_strategy(StrategyKind::Condition, &config).await.unwrap();
    let observer = run_strategy(StrategyKind::Observer, &config).await.unwrap();

    // Pings behind blocked requests wait at least one producer delay
    assert!(condition.max_ping_ms >= config.delay_min_ms as f64);
    assert!(
        condition.max_ping_ms > observer.max_ping_ms,
        "condition {:.3}ms vs observer {:.3}ms",
        condition.max_ping_ms,
        observer.max_ping_ms
    );
}

#[tokio::test]
async fn test_single_request_latency_is_bounded() {
    let config = small_bench();

    for kind in StrategyKind::ALL {
        let (waiter, _actors) = spawn_waiter(kind, &config);
        let latency = waiter.request(7).await.unwrap();
        assert!(latency < Duration::from_secs(1), "{} took {:?}", kind, latency);
    }
}

#[tokio::test]
async fn test_request_times_out_when_producer_is_slow() {
    let config = BenchConfig {
        delay_min_ms: 2_000,
        delay_max_ms: 2_000,
        timeout_secs: 1,
        ..small_bench()
    };

    let (waiter, _actors) = spawn_waiter(StrategyKind::Observer, &config);
    assert!(waiter.request(1).await.is_err());
}
