//! Integration tests for observables and the compositor
//!
//! Observables here live in their own actors (`spawn_observable`) and are
//! watched from the test task or from spawned observers, so every
//! interaction crosses task boundaries through mailboxes.

use beacon_engine::actor::{self, mailbox};
use beacon_engine::observable::{spawn_observable, Message, ObserveHandle};
use beacon_engine::observer::{observe, observe_each, Observer};
use sdk::errors::EngineError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn text(msg: &Message) -> Option<String> {
    msg.value::<String>().unwrap().map(|v| v.to_string())
}

#[tokio::test]
async fn test_watcher_sees_every_transition() {
    let o = spawn_observable::<String>("o");
    let (mailbox, mut inbox) = mailbox::<Message>("task1");

    let initial = o
        .observable_ref()
        .add_observer(ObserveHandle::new("task1"), mailbox, true)
        .await
        .unwrap();
    assert!(initial.is_absent());

    o.update("v1".to_string()).unwrap();
    assert_eq!(text(&inbox.recv().await.unwrap()).as_deref(), Some("v1"));
    assert_eq!(o.get().await.unwrap().unwrap().as_str(), "v1");

    o.reset().unwrap();
    assert!(inbox.recv().await.unwrap().is_absent());
    assert!(o.get().await.unwrap().is_none());

    o.update("v2".to_string()).unwrap();
    assert_eq!(text(&inbox.recv().await.unwrap()).as_deref(), Some("v2"));
    assert_eq!(o.get().await.unwrap().unwrap().as_str(), "v2");
}

#[tokio::test]
async fn test_late_watcher_gets_existing_value() {
    let o = spawn_observable::<String>("o");
    o.update("x".to_string()).unwrap();

    let (mailbox, mut inbox) = mailbox::<Message>("late");
    let initial = o
        .observable_ref()
        .add_observer(ObserveHandle::new("late"), mailbox, true)
        .await
        .unwrap();

    assert_eq!(text(&initial).as_deref(), Some("x"));
    assert!(inbox.try_recv().is_none());
}

#[tokio::test]
async fn test_dead_watchers_are_purged_on_notify() {
    let o = spawn_observable::<u32>("o");
    let reference = o.observable_ref();

    // Watchers whose task finished while their mailbox stays open
    let mut leftovers = Vec::new();
    for i in 0..2 {
        let reference = reference.clone();
        let watcher = actor::spawn(format!("short-lived-{}", i), async move {
            let (mailbox, inbox) = mailbox::<Message>("short-lived");
            reference
                .add_observer(ObserveHandle::new("short-lived"), mailbox, true)
                .await
                .map(|_| inbox)
        });
        leftovers.push(watcher.join().await.unwrap().unwrap());
    }

    let mut alive = Vec::new();
    for i in 0..3 {
        let (mailbox, inbox) = mailbox::<Message>("alive");
        reference
            .add_observer(ObserveHandle::new(format!("alive-{}", i)), mailbox, true)
            .await
            .unwrap();
        alive.push(inbox);
    }
    assert_eq!(reference.inspect().await.unwrap().observers, 5);

    o.update(1).unwrap();
    for inbox in alive.iter_mut() {
        assert_eq!(*inbox.recv().await.unwrap().value::<u32>().unwrap().unwrap(), 1);
    }

    assert_eq!(reference.inspect().await.unwrap().observers, 3);
    for inbox in leftovers.iter_mut() {
        assert!(inbox.try_recv().is_none());
    }
}

#[tokio::test]
async fn test_observe_waits_for_every_source() {
    let a = spawn_observable::<u32>("a");
    let b = spawn_observable::<String>("b");
    a.update(1).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let waiting = tokio::spawn({
        let set = (a.observable_ref(), b.observable_ref());
        let calls = Arc::clone(&calls);
        async move {
            observe(set, WAIT, |(a, b)| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, EngineError>((*a, b.to_string()))
            })
            .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!waiting.is_finished());

    b.update("b1".to_string()).unwrap();
    let joined = waiting.await.unwrap().unwrap();

    assert_eq!(joined, (1, "b1".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_observe_ready_sources_runs_immediately() {
    let a = spawn_observable::<u32>("a");
    let b = spawn_observable::<u32>("b");
    a.update(1).unwrap();
    b.update(2).unwrap();

    let sum = observe((a.observable_ref(), b.observable_ref()), WAIT, |(a, b)| {
        Ok::<_, EngineError>(*a + *b)
    })
    .await
    .unwrap();

    assert_eq!(sum, 3);
}

#[tokio::test]
async fn test_one_shot_observe_unregisters_everywhere() {
    let a = spawn_observable::<u32>("a");
    let b = spawn_observable::<u32>("b");
    a.update(1).unwrap();
    b.update(2).unwrap();

    observe((a.observable_ref(), b.observable_ref()), WAIT, Ok::<_, EngineError>)
        .await
        .unwrap();

    assert_eq!(a.observable_ref().inspect().await.unwrap().observers, 0);
    assert_eq!(b.observable_ref().inspect().await.unwrap().observers, 0);
}

#[tokio::test]
async fn test_observe_timeout_revokes_partial_subscriptions() {
    let a = spawn_observable::<u32>("a");
    let b = spawn_observable::<u32>("b");
    a.update(1).unwrap();

    let timeout = Duration::from_millis(100);
    let started = Instant::now();
    let result = observe(
        (a.observable_ref(), b.observable_ref()),
        timeout,
        Ok::<_, EngineError>,
    )
    .await;
    let elapsed = started.elapsed();

    match result {
        Err(EngineError::ObserveTimeout { timeout: t, pending }) => {
            assert_eq!(t, timeout);
            assert_eq!(pending, vec!["b".to_string()]);
        }
        other => panic!("expected timeout, got {:?}", other.map(|_| ())),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < WAIT);

    assert_eq!(a.observable_ref().inspect().await.unwrap().observers, 0);
    assert_eq!(b.observable_ref().inspect().await.unwrap().observers, 0);
}

#[tokio::test]
async fn test_computation_error_propagates_unchanged() {
    let a = spawn_observable::<u32>("a");
    a.update(7).unwrap();

    let result: anyhow::Result<()> = observe(a.observable_ref(), WAIT, |value| {
        anyhow::bail!("cannot use {}", value)
    })
    .await;

    assert_eq!(result.unwrap_err().to_string(), "cannot use 7");
    assert_eq!(a.observable_ref().inspect().await.unwrap().observers, 0);
}

#[tokio::test]
async fn test_persistent_observe_recomputes_once_per_change() {
    let a = spawn_observable::<u32>("a");
    let b = spawn_observable::<u32>("b");
    let (results, mut received) = mpsc::unbounded_channel();

    let following = tokio::spawn({
        let set = (a.observable_ref(), b.observable_ref());
        async move {
            observe_each(set, WAIT, |(a, b)| {
                let _ = results.send((*a, *b));
                Ok::<_, EngineError>(())
            })
            .await
        }
    });

    a.update(1).unwrap();
    b.update(10).unwrap();
    assert_eq!(received.recv().await, Some((1, 10)));

    a.update(2).unwrap();
    assert_eq!(received.recv().await, Some((2, 10)));

    b.update(20).unwrap();
    assert_eq!(received.recv().await, Some((2, 20)));

    // A reset closes the ready window without a recompute
    a.reset().unwrap();
    a.update(3).unwrap();
    assert_eq!(received.recv().await, Some((3, 20)));

    drop(a);
    drop(b);
    following.await.unwrap().unwrap();
    assert_eq!(received.recv().await, None);
}

#[tokio::test]
async fn test_persistent_observe_timeout_revokes_subscriptions() {
    let a = spawn_observable::<u32>("a");
    let b = spawn_observable::<u32>("b");
    a.update(1).unwrap();

    let calls = AtomicUsize::new(0);
    let result = observe_each(
        (a.observable_ref(), b.observable_ref()),
        Duration::from_millis(50),
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, EngineError>(())
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(EngineError::ObserveTimeout { ref pending, .. }) if pending == &vec!["b".to_string()]
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(a.observable_ref().inspect().await.unwrap().observers, 0);
    assert_eq!(b.observable_ref().inspect().await.unwrap().observers, 0);

    // A later publish reaches nobody from the failed call
    b.update(2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_persistent_observer_in_select_loop() {
    let a = spawn_observable::<u32>("a");
    let (commands, mut inbox) = mailbox::<&'static str>("commands");

    let mut observer = Observer::new(a.observable_ref());
    observer.subscribe().await.unwrap();
    assert_eq!(observer.pending_slots(), vec!["a".to_string()]);

    a.update(5).unwrap();
    commands.send("stop").unwrap();

    let mut seen = Vec::new();
    let mut stopped = false;
    while !(stopped && seen.len() == 1) {
        tokio::select! {
            Some(cmd) = inbox.recv() => {
                assert_eq!(cmd, "stop");
                stopped = true;
            }
            Some(value) = observer.next() => seen.push(*value.unwrap()),
        }
    }

    assert_eq!(seen, vec![5]);
    assert!(observer.is_ready());
}

#[tokio::test]
async fn test_observe_map_of_named_sources() {
    let x = spawn_observable::<u32>("node-x");
    let y = spawn_observable::<u32>("node-y");
    x.update(1).unwrap();

    let mut set = BTreeMap::new();
    set.insert("x".to_string(), x.observable_ref());
    set.insert("y".to_string(), y.observable_ref());

    let result = observe(set.clone(), Duration::from_millis(50), Ok::<_, EngineError>).await;
    assert!(matches!(
        result,
        Err(EngineError::ObserveTimeout { ref pending, .. }) if pending == &vec!["y".to_string()]
    ));

    y.update(2).unwrap();
    let joined = observe(set, WAIT, Ok::<_, EngineError>).await.unwrap();
    assert_eq!(*joined["x"], 1);
    assert_eq!(*joined["y"], 2);
}

#[tokio::test]
async fn test_watcher_actor_termination_invalidates_handles() {
    let o = spawn_observable::<u32>("o");
    let reference = o.observable_ref();

    let watcher = actor::spawn("watcher", {
        let reference = reference.clone();
        async move {
            let mut observer = Observer::new(reference);
            observer.subscribe().await?;
            // Leak the observer so only task termination can invalidate it
            std::mem::forget(observer);
            Ok::<_, EngineError>(())
        }
    });
    watcher.join().await.unwrap().unwrap();
    assert_eq!(reference.inspect().await.unwrap().observers, 1);

    o.update(1).unwrap();
    // A later request is served after the update's fan-out
    o.update(2).unwrap();
    assert_eq!(*o.get().await.unwrap().unwrap(), 2);

    assert_eq!(reference.inspect().await.unwrap().observers, 0);
}
