//! Combined usage of pool, queue, and breaker, mirroring the gateway's
//! outbound call path: acquire a connection, run the upstream call through
//! the dependency's breaker, schedule the whole thing on a named queue.

use std::sync::Arc;
use std::time::Duration;

use lexmux_resilience::{
    CircuitBreaker, CircuitBreakerOptions, ConnectionPoolManager, ConnectionPoolOptions, Error,
    RequestQueueManager, RequestQueueOptions,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn gateway_call_path_composes_all_three_primitives() {
    tests::init_tracing();
    let pools = ConnectionPoolManager::new();
    let queues = RequestQueueManager::new();
    let breaker = Arc::new(CircuitBreaker::new(
        "courtlistener-api",
        CircuitBreakerOptions {
            failure_threshold: 3,
            timeout: Duration::from_secs(60),
        },
    ));

    let pool = pools.get_pool(
        "www.courtlistener.com",
        ConnectionPoolOptions {
            max_connections: 2,
            ..ConnectionPoolOptions::default()
        },
    );
    let queue = queues.get_queue(
        "opinion-search",
        RequestQueueOptions {
            max_concurrent: 2,
            ..RequestQueueOptions::default()
        },
    );

    let mut futs = Vec::new();
    for i in 0..6u32 {
        let pool = Arc::clone(&pool);
        let breaker = Arc::clone(&breaker);
        futs.push(queue.enqueue(
            move || {
                let pool = Arc::clone(&pool);
                let breaker = Arc::clone(&breaker);
                async move {
                    let conn = pool.acquire().await.map_err(anyhow::Error::new)?;
                    let result = breaker
                        .execute(|| async move { Ok(format!("opinion-{i}")) })
                        .await
                        .map_err(anyhow::Error::new);
                    pool.release(&conn);
                    result
                }
            },
            0,
            None,
        ));
    }
    for (i, fut) in futs.into_iter().enumerate() {
        assert_eq!(fut.await.unwrap(), format!("opinion-{i}"));
    }

    let pool_stats = pool.stats();
    assert_eq!(pool_stats.active_connections, 0);
    assert!(pool_stats.total_connections <= 2);
    assert_eq!(queue.stats().queue_length, 0);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_fails_queued_work_fast() {
    tests::init_tracing();
    let queues = RequestQueueManager::new();
    let breaker = Arc::new(CircuitBreaker::new(
        "courtlistener-api",
        CircuitBreakerOptions {
            failure_threshold: 1,
            timeout: Duration::from_secs(300),
        },
    ));

    // Trip the breaker.
    let _ = breaker
        .execute(|| async { Err::<(), _>(anyhow::anyhow!("connection refused")) })
        .await;

    let queue = queues.get_queue(
        "citation-lookup",
        RequestQueueOptions {
            retry_attempts: 2,
            retry_delay: Duration::from_millis(100),
            ..RequestQueueOptions::default()
        },
    );

    // Every dispatch is rejected synchronously by the breaker; after the
    // retries run out the breaker rejection surfaces as the last error.
    let op_breaker = Arc::clone(&breaker);
    let err = queue
        .enqueue(
            move || {
                let breaker = Arc::clone(&op_breaker);
                async move {
                    breaker
                        .execute(|| async { Ok(()) })
                        .await
                        .map_err(anyhow::Error::new)
                }
            },
            0,
            None,
        )
        .await
        .unwrap_err();

    match err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(source
                .downcast_ref::<Error>()
                .is_some_and(|e| matches!(e, Error::CircuitOpen { .. })));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn graceful_shutdown_closes_both_registries() {
    tests::init_tracing();
    let pools = ConnectionPoolManager::new();
    let queues = RequestQueueManager::new();
    let pool = pools.get_pool("www.courtlistener.com", ConnectionPoolOptions::default());
    let queue = queues.get_queue("opinion-search", RequestQueueOptions::default());

    queues.close_all();
    pools.close_all();

    assert!(matches!(
        pool.acquire().await.unwrap_err(),
        Error::PoolClosed { .. }
    ));
    assert!(matches!(
        queue.enqueue(|| async { Ok(()) }, 0, None).await.unwrap_err(),
        Error::QueueClosed { .. }
    ));
    assert_eq!(pools.pool_count(), 0);
    assert_eq!(queues.queue_count(), 0);
}
