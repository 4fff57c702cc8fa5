use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auto_marking::{Classify, CoordinatorConfig, FailureKind, RequestCoordinator, TaskError};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};

#[derive(Debug, Error, PartialEq)]
enum ApiFailure {
    #[error("429 rate limited")]
    RateLimited,
    #[error("400 bad request")]
    BadRequest,
}

impl Classify for ApiFailure {
    fn failure_kind(&self) -> FailureKind {
        match self {
            ApiFailure::RateLimited => FailureKind::Retryable,
            ApiFailure::BadRequest => FailureKind::Terminal,
        }
    }
}

fn coordinator(max_concurrent: usize) -> RequestCoordinator {
    RequestCoordinator::new(CoordinatorConfig {
        max_concurrent,
        min_delay: Duration::ZERO,
        max_retries: 3,
        backoff_multiplier: 2.0,
        base_delay: Duration::from_millis(100),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling_and_wall_clock() {
    let coordinator = coordinator(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..5)
        .map(|i| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let observer = coordinator.clone();
            coordinator.enqueue(
                move || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    let observer = observer.clone();
                    async move {
                        let running = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(running, Ordering::SeqCst);
                        assert!(observer.stats().active_requests <= 2);
                        sleep(Duration::from_millis(100)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ApiFailure>(i)
                    }
                },
                0,
            )
        })
        .collect();

    let results = join_all(handles).await;
    let elapsed = start.elapsed();

    let values: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    // ceil(5 / 2) × 100ms
    assert!(elapsed >= Duration::from_millis(300), "elapsed = {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(400), "elapsed = {:?}", elapsed);
    assert_eq!(coordinator.stats().total_requests, 5);
}

/// 生成一个记录执行顺序的任务
fn recorder(
    order: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
) -> impl Fn() -> futures::future::Ready<Result<(), ApiFailure>> + Send + Sync + 'static {
    let order = Arc::clone(order);
    move || {
        order.lock().unwrap().push(name);
        futures::future::ready(Ok(()))
    }
}

fn blocker() -> impl std::future::Future<Output = Result<(), ApiFailure>> {
    async {
        sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_fifo_within_priority() {
    let coordinator = coordinator(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let busy = coordinator.enqueue(blocker, 0);
    let a = coordinator.enqueue(recorder(&order, "A"), 1);
    let b = coordinator.enqueue(recorder(&order, "B"), 1);
    let c = coordinator.enqueue(recorder(&order, "C"), 1);

    busy.await.unwrap();
    a.await.unwrap();
    b.await.unwrap();
    c.await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_higher_priority_takes_next_slot() {
    let coordinator = coordinator(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let busy = coordinator.enqueue(blocker, 0);
    let low = coordinator.enqueue(recorder(&order, "A"), 1);
    let high = coordinator.enqueue(recorder(&order, "B"), 5);

    assert_eq!(coordinator.stats().queue_length, 2);

    busy.await.unwrap();
    low.await.unwrap();
    high.await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["B", "A"]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_partial_failure() {
    let coordinator = coordinator(2);

    let results = coordinator
        .batch(vec![1, 2, 3], 0, |n: i32| async move {
            if n == 2 {
                Err(ApiFailure::BadRequest)
            } else {
                Ok(n * 10)
            }
        })
        .await;

    assert_eq!(results.len(), 3);
    assert!(matches!(results[0], Ok(10)));
    assert!(matches!(
        results[1],
        Err(TaskError::Failed(ApiFailure::BadRequest))
    ));
    assert!(matches!(results[2], Ok(30)));
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_succeed() {
    let coordinator = coordinator(1);
    let calls = Arc::new(AtomicU32::new(0));
    let started = Arc::new(Mutex::new(Vec::new()));

    let (counter, log) = (Arc::clone(&calls), Arc::clone(&started));
    let value = coordinator
        .enqueue(
            move || {
                log.lock().unwrap().push(Instant::now());
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ApiFailure::RateLimited)
                    } else {
                        Ok("graded")
                    }
                }
            },
            0,
        )
        .await
        .unwrap();

    assert_eq!(value, "graded");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let started = started.lock().unwrap();
    assert!(started[1] - started[0] >= Duration::from_millis(100));

    // 每次派发计一次请求
    assert_eq!(coordinator.stats().total_requests, 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion() {
    let coordinator = coordinator(1);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let start = Instant::now();
    let result = coordinator
        .enqueue(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiFailure::RateLimited) }
            },
            0,
        )
        .await;
    let elapsed = start.elapsed();

    match result {
        Err(TaskError::RetriesExhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 4);
            assert_eq!(last_error, ApiFailure::RateLimited);
        }
        other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
    }

    // 1 次首发 + 3 次重试
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // 100 + 200 + 400
    assert!(elapsed >= Duration::from_millis(700), "elapsed = {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(800), "elapsed = {:?}", elapsed);
    assert_eq!(coordinator.stats().active_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_is_not_retried() {
    let coordinator = coordinator(1);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result = coordinator
        .enqueue(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiFailure::BadRequest) }
            },
            0,
        )
        .await;

    assert!(matches!(result, Err(TaskError::Failed(ApiFailure::BadRequest))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cost_accounting() {
    let coordinator = coordinator(3);

    let handles: Vec<_> = (0..3)
        .map(|_| coordinator.enqueue(|| async { Ok::<_, ApiFailure>(()) }, 0))
        .collect();
    for result in join_all(handles).await {
        result.unwrap();
    }

    for _ in 0..3 {
        coordinator.track_cost(0.05);
    }

    let stats = coordinator.stats();
    assert_eq!(stats.total_requests, 3);
    assert!((stats.total_cost - 0.15).abs() < 1e-9);
    assert!((stats.average_cost_per_request - 0.05).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_reset_stats_leaves_work_untouched() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Notify::new());

    let held = Arc::clone(&gate);
    let running = coordinator.enqueue(
        move || {
            let held = Arc::clone(&held);
            async move {
                held.notified().await;
                Ok::<_, ApiFailure>("first")
            }
        },
        0,
    );
    let queued = coordinator.enqueue(|| async { Ok::<_, ApiFailure>("second") }, 0);
    coordinator.track_cost(1.25);

    let before = coordinator.stats();
    assert_eq!(before.total_requests, 1);
    assert_eq!(before.queue_length, 1);

    coordinator.reset_stats();

    let after = coordinator.stats();
    assert_eq!(after.total_requests, 0);
    assert_eq!(after.total_cost, 0.0);
    assert_eq!(after.average_cost_per_request, 0.0);
    assert_eq!(after.active_requests, 1);
    assert_eq!(after.queue_length, 1);

    gate.notify_one();
    assert_eq!(running.await.unwrap(), "first");
    assert_eq!(queued.await.unwrap(), "second");
    assert_eq!(coordinator.stats().total_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_work_runs_without_awaiting_handle() {
    let coordinator = coordinator(1);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    drop(coordinator.enqueue(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ApiFailure>(()) }
        },
        0,
    ));

    sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_and_rejects() {
    let coordinator = coordinator(1);
    let completed = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let completed = Arc::clone(&completed);
            coordinator.enqueue(
                move || {
                    let completed = Arc::clone(&completed);
                    async move {
                        sleep(Duration::from_millis(100)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ApiFailure>(())
                    }
                },
                0,
            )
        })
        .collect();

    coordinator.shutdown().await;

    assert_eq!(completed.load(Ordering::SeqCst), 3);
    assert!(!coordinator.is_accepting());
    for result in join_all(handles).await {
        assert!(result.is_ok());
    }

    let rejected = coordinator
        .enqueue(|| async { Ok::<_, ApiFailure>(()) }, 0)
        .await;
    assert!(matches!(rejected, Err(TaskError::ShutDown)));
}
