//! Request queue integration tests.

use std::sync::Arc;
use std::time::Duration;

use lexmux_resilience::{Error, RequestQueueManager, RequestQueueOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::ops::CallCounter;
use tokio::sync::Notify;

#[tokio::test]
async fn high_priority_work_jumps_the_line() {
    tests::init_tracing();
    let manager = RequestQueueManager::new();
    let queue = manager.get_queue(
        "opinion-search",
        RequestQueueOptions {
            max_concurrent: 1,
            ..RequestQueueOptions::default()
        },
    );

    let gate = Arc::new(Notify::new());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    // Hold the single slot so later requests queue up behind it.
    let blocker_gate = Arc::clone(&gate);
    let blocker = queue.enqueue(
        move || {
            let gate = Arc::clone(&blocker_gate);
            async move {
                gate.notified().await;
                Ok(())
            }
        },
        i32::MAX,
        None,
    );

    let mut settled = Vec::new();
    for (tag, priority) in [("background", 0), ("interactive", 10), ("bulk", -5)] {
        let order = Arc::clone(&order);
        settled.push(queue.enqueue(
            move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push(tag);
                    Ok(())
                }
            },
            priority,
            Some(json!({ "tool": tag })),
        ));
    }
    tokio::task::yield_now().await;
    gate.notify_one();

    blocker.await.unwrap();
    for fut in settled {
        fut.await.unwrap();
    }
    assert_eq!(*order.lock(), vec!["interactive", "background", "bulk"]);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_absorbed_by_retry() {
    tests::init_tracing();
    let manager = RequestQueueManager::new();
    let queue = manager.get_queue(
        "opinion-search",
        RequestQueueOptions {
            retry_attempts: 3,
            retry_delay: Duration::from_millis(200),
            ..RequestQueueOptions::default()
        },
    );

    // Fails twice, succeeds on the third dispatch; the caller only sees
    // the final success.
    let calls = CallCounter::new();
    let op_calls = calls.clone();
    let result = queue
        .enqueue(
            move || {
                let calls = op_calls.clone();
                async move {
                    let n = calls.bump();
                    if n < 3 {
                        anyhow::bail!("upstream 502 on attempt {n}");
                    }
                    Ok("opinion text")
                }
            },
            0,
            None,
        )
        .await
        .unwrap();

    assert_eq!(result, "opinion text");
    assert_eq!(calls.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_the_last_error() {
    tests::init_tracing();
    let manager = RequestQueueManager::new();
    let queue = manager.get_queue(
        "opinion-search",
        RequestQueueOptions {
            retry_attempts: 2,
            retry_delay: Duration::from_millis(100),
            ..RequestQueueOptions::default()
        },
    );

    let calls = CallCounter::new();
    let op_calls = calls.clone();
    let err = queue
        .enqueue(
            move || {
                let calls = op_calls.clone();
                async move {
                    let n = calls.bump();
                    Err::<(), _>(anyhow::anyhow!("attempt {n} rejected"))
                }
            },
            0,
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.count(), 2);
    match err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert_eq!(source.to_string(), "attempt 2 rejected");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limited_queue_spaces_out_dispatches() {
    tests::init_tracing();
    let manager = RequestQueueManager::new();
    let queue = manager.get_queue(
        "citation-lookup",
        RequestQueueOptions {
            max_concurrent: 1,
            rate_limit: 2.0,
            ..RequestQueueOptions::default()
        },
    );

    let starts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut futs = Vec::new();
    for _ in 0..4 {
        let starts = Arc::clone(&starts);
        futs.push(queue.enqueue(
            move || {
                let starts = Arc::clone(&starts);
                async move {
                    starts.lock().push(tokio::time::Instant::now());
                    Ok(())
                }
            },
            0,
            None,
        ));
    }
    for fut in futs {
        fut.await.unwrap();
    }

    let starts = starts.lock();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(500));
    }
}

#[tokio::test]
async fn closing_a_queue_rejects_only_pending_requests() {
    tests::init_tracing();
    let manager = RequestQueueManager::new();
    let queue = manager.get_queue(
        "docket-fetch",
        RequestQueueOptions {
            max_concurrent: 1,
            ..RequestQueueOptions::default()
        },
    );
    let gate = Arc::new(Notify::new());

    let in_flight_gate = Arc::clone(&gate);
    let in_flight = queue.enqueue(
        move || {
            let gate = Arc::clone(&in_flight_gate);
            async move {
                gate.notified().await;
                Ok(7)
            }
        },
        0,
        None,
    );
    tokio::task::yield_now().await;

    let pending = queue.enqueue(|| async { Ok(()) }, 0, None);
    manager.close_all();

    assert!(matches!(pending.await, Err(Error::QueueClosed { .. })));
    gate.notify_one();
    assert_eq!(in_flight.await.unwrap(), 7);
}
