//! 请求协调器
//!
//! 所有外部 AI / OCR 调用都经由这里派发：
//!
//! - 限制同时在途的请求数量（`max_concurrent`）
//! - 相邻两批派发之间至少间隔 `min_delay`，平滑突发提交
//! - 可重试失败按指数退避后重新排队，超过 `max_retries` 后返回最后一次错误
//! - 记录请求次数与调用方上报的费用
//!
//! 协调器是显式创建、按值克隆传递的句柄，没有全局单例。
//! 排队中的任务在一个 oneshot 上等待"执行名额"（[`SlotGuard`]），
//! 名额在 drop 时归还（包括 panic 展开时），归还后立即尝试派发下一批。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::policy::CoordinatorConfig;
use super::queue::TaskQueue;
use super::stats::CoordinatorStats;
use super::task::{Classify, FailureKind, TaskError, TaskHandle};
use crate::error::AppResult;

/// 请求协调器句柄
///
/// `Clone` 得到的是同一个协调器
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: CoordinatorConfig,
    state: Mutex<State>,
    drained: Notify,
}

struct State {
    queue: TaskQueue<oneshot::Sender<SlotGuard>>,
    /// 正在执行的任务数
    active: usize,
    /// 已接收但尚未得出结果的任务数（含排队、执行、退避中）
    pending: usize,
    last_dispatch: Option<Instant>,
    timer_armed: bool,
    accepting: bool,
    total_requests: u64,
    total_cost: f64,
}

/// 执行名额，drop 时归还
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.release_slot();
    }
}

impl RequestCoordinator {
    /// 创建协调器
    ///
    /// 需要在 tokio 运行时中使用
    pub fn new(config: CoordinatorConfig) -> AppResult<Self> {
        config.validate()?;

        debug!(
            "创建请求协调器: 最大并发 {}, 派发间隔 {:?}, 最大重试 {}, 退避倍数 {}",
            config.max_concurrent, config.min_delay, config.max_retries, config.backoff_multiplier
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    queue: TaskQueue::new(),
                    active: 0,
                    pending: 0,
                    last_dispatch: None,
                    timer_armed: false,
                    accepting: true,
                    total_requests: 0,
                    total_cost: 0.0,
                }),
                drained: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// 提交一个任务
    ///
    /// `work` 每次尝试都会被重新调用一次。任务在调用本函数时同步入队，
    /// 因此同优先级下先调用者先执行；之后无论是否 await 返回的句柄，任务都会执行。
    ///
    /// # 参数
    /// - `work`: 无参异步操作，错误类型通过 [`Classify`] 决定是否重试
    /// - `priority`: 优先级，数值越大越先执行
    ///
    /// # 返回
    /// 返回任务句柄，await 得到 `work` 的结果或最终失败
    pub fn enqueue<T, E, F, Fut>(&self, work: F, priority: i32) -> TaskHandle<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + Send + 'static,
    {
        let (sequence, slot) = {
            let mut state = self.inner.lock();
            if !state.accepting {
                warn!("协调器已关闭，拒绝新任务 (优先级 {})", priority);
                return TaskHandle::rejected(TaskError::ShutDown);
            }

            let (tx, rx) = oneshot::channel();
            let sequence = state.queue.push(priority, tx);
            state.pending += 1;
            (sequence, rx)
        };

        debug!("任务 #{} 入队 (优先级 {})", sequence, priority);

        let driver = TaskDriver {
            inner: Arc::clone(&self.inner),
            priority,
            sequence,
        };
        let handle = tokio::spawn(driver.run(work, slot));

        self.inner.dispatch();

        TaskHandle::running(handle)
    }

    /// 批量提交同一优先级的任务
    ///
    /// 每个元素对应一个任务，与其他任务共享同一个并发上限。
    /// 单个任务失败不会影响其他任务，返回结果与输入顺序一致。
    pub async fn batch<D, T, E, F, Fut>(
        &self,
        items: Vec<D>,
        priority: i32,
        execute: F,
    ) -> Vec<Result<T, TaskError<E>>>
    where
        D: Clone + Send + Sync + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + Send + 'static,
    {
        let execute = Arc::new(execute);

        let handles: Vec<_> = items
            .into_iter()
            .map(|data| {
                let execute = Arc::clone(&execute);
                self.enqueue(move || execute(data.clone()), priority)
            })
            .collect();

        join_all(handles).await
    }

    /// 当前统计快照
    pub fn stats(&self) -> CoordinatorStats {
        let state = self.inner.lock();
        CoordinatorStats::new(
            state.queue.len(),
            state.active,
            state.total_requests,
            state.total_cost,
        )
    }

    /// 累加调用方上报的费用
    ///
    /// 负数或非有限值会被忽略，保证累计费用只增不减
    pub fn track_cost(&self, amount: f64) {
        if !amount.is_finite() || amount < 0.0 {
            warn!("忽略无效的费用上报: {}", amount);
            return;
        }
        self.inner.lock().total_cost += amount;
    }

    /// 清零请求数与费用，不影响排队和执行中的任务
    pub fn reset_stats(&self) {
        let mut state = self.inner.lock();
        state.total_requests = 0;
        state.total_cost = 0.0;
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.lock().accepting
    }

    /// 停止接收新任务，并等待所有已接收的任务得出结果
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            state.accepting = false;
            info!(
                "🛑 协调器停止接收新任务，等待 {} 个任务完成...",
                state.pending
            );
        }

        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.lock().pending == 0 {
                break;
            }
            notified.await;
        }

        info!("✓ 协调器已关闭: {}", self.stats());
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 派发一批任务
    ///
    /// 持锁完成"检查名额 + 占用名额"，锁外发送名额
    fn dispatch(self: &Arc<Self>) {
        let mut grants = Vec::new();
        {
            let mut state = self.lock();
            if state.active >= self.config.max_concurrent || state.queue.is_empty() {
                return;
            }

            let now = Instant::now();
            if let Some(last) = state.last_dispatch {
                let ready_at = last + self.config.min_delay;
                if now < ready_at {
                    if !state.timer_armed {
                        state.timer_armed = true;
                        self.arm_timer(ready_at);
                    }
                    return;
                }
            }

            while state.active < self.config.max_concurrent {
                let Some(tx) = state.queue.pop() else {
                    break;
                };
                if tx.is_closed() {
                    continue;
                }
                state.active += 1;
                state.total_requests += 1;
                grants.push(tx);
            }

            if !grants.is_empty() {
                state.last_dispatch = Some(now);
                debug!(
                    "派发 {} 个任务 (执行中 {}/{}, 排队 {})",
                    grants.len(),
                    state.active,
                    self.config.max_concurrent,
                    state.queue.len()
                );
            }
        }

        for tx in grants {
            let slot = SlotGuard {
                inner: Arc::clone(self),
            };
            // 接收方已不在时名额随返回值一起 drop，在锁外归还
            let _ = tx.send(slot);
        }
    }

    fn arm_timer(self: &Arc<Self>, ready_at: Instant) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            inner.lock().timer_armed = false;
            inner.dispatch();
        });
    }

    fn release_slot(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            state.active = match state.active.checked_sub(1) {
                Some(active) => active,
                None => panic!("调度状态损坏: 归还名额时执行中任务数已为 0"),
            };
        }
        self.dispatch();
    }

    /// 重试任务以原优先级、原序号回到队列
    fn requeue(self: &Arc<Self>, priority: i32, sequence: u64) -> oneshot::Receiver<SlotGuard> {
        let (tx, rx) = oneshot::channel();
        self.lock().queue.push_with_sequence(priority, sequence, tx);
        self.dispatch();
        rx
    }

    fn finish_task(&self) {
        let drained = {
            let mut state = self.lock();
            state.pending = match state.pending.checked_sub(1) {
                Some(pending) => pending,
                None => panic!("调度状态损坏: 完成任务时待处理任务数已为 0"),
            };
            state.pending == 0
        };

        if drained {
            self.drained.notify_waiters();
        }
    }
}

/// 单个任务的执行循环：等名额 → 执行 → 成功/失败/退避重试
struct TaskDriver {
    inner: Arc<Inner>,
    priority: i32,
    sequence: u64,
}

impl TaskDriver {
    async fn run<T, E, F, Fut>(
        self,
        work: F,
        slot: oneshot::Receiver<SlotGuard>,
    ) -> Result<T, TaskError<E>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Classify,
    {
        let outcome = self.drive(&work, slot).await;
        self.inner.finish_task();
        outcome
    }

    async fn drive<T, E, F, Fut>(
        &self,
        work: &F,
        mut slot: oneshot::Receiver<SlotGuard>,
    ) -> Result<T, TaskError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let config = &self.inner.config;
        let mut retries = 0u32;

        loop {
            let guard = slot.await.map_err(|_| TaskError::ShutDown)?;

            let attempt = AssertUnwindSafe(async { work().await }).catch_unwind();
            let result = match config.task_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("任务 #{} 超时 ({:?})", self.sequence, limit);
                        return Err(TaskError::TimedOut(limit));
                    }
                },
                None => attempt.await,
            };
            drop(guard);

            let error = match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("任务 #{} panic: {}", self.sequence, message);
                    return Err(TaskError::Panicked(message));
                }
            };

            if error.failure_kind() == FailureKind::Terminal {
                debug!("任务 #{} 不可重试失败", self.sequence);
                return Err(TaskError::Failed(error));
            }

            if retries >= config.max_retries {
                error!(
                    "任务 #{} 已重试 {} 次仍失败，放弃",
                    self.sequence, retries
                );
                return Err(TaskError::RetriesExhausted {
                    attempts: retries + 1,
                    last_error: error,
                });
            }

            let delay = config.backoff_delay(retries);
            warn!(
                "任务 #{} 可重试失败，{:?} 后第 {}/{} 次重试",
                self.sequence,
                delay,
                retries + 1,
                config.max_retries
            );
            tokio::time::sleep(delay).await;

            retries += 1;
            slot = self.inner.requeue(self.priority, self.sequence);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("测试错误")]
    struct TestError;

    impl Classify for TestError {
        fn failure_kind(&self) -> FailureKind {
            FailureKind::Terminal
        }
    }

    fn immediate_config(max_concurrent: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrent,
            min_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = RequestCoordinator::new(CoordinatorConfig {
            max_concurrent: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_returns_value() {
        let coordinator = RequestCoordinator::new(immediate_config(2)).unwrap();

        let value = coordinator
            .enqueue(|| async { Ok::<_, TestError>(42) }, 0)
            .await
            .unwrap();

        assert_eq!(value, 42);
        let stats = coordinator.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.active_requests, 0);
        assert_eq!(stats.queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_spaces_batches() {
        let coordinator = RequestCoordinator::new(CoordinatorConfig {
            max_concurrent: 5,
            min_delay: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();

        let start = Instant::now();
        let first = coordinator.enqueue(move || async move { Ok::<_, TestError>(start.elapsed()) }, 0);
        let second =
            coordinator.enqueue(move || async move { Ok::<_, TestError>(start.elapsed()) }, 0);

        let first_started = first.await.unwrap();
        let second_started = second.await.unwrap();

        assert!(first_started < Duration::from_millis(500));
        assert!(second_started >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_frees_its_slot() {
        let coordinator = RequestCoordinator::new(immediate_config(1)).unwrap();

        let panicked = coordinator.enqueue(
            || async {
                if true {
                    panic!("boom");
                }
                Ok::<u32, TestError>(0)
            },
            0,
        );
        let after = coordinator.enqueue(|| async { Ok::<_, TestError>(7) }, 0);

        assert!(matches!(panicked.await, Err(TaskError::Panicked(msg)) if msg.contains("boom")));
        assert_eq!(after.await.unwrap(), 7);
        assert_eq!(coordinator.stats().active_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_terminal() {
        let coordinator = RequestCoordinator::new(CoordinatorConfig {
            task_timeout: Some(Duration::from_millis(50)),
            ..immediate_config(1)
        })
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let result = coordinator
            .enqueue(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok::<_, TestError>(())
                    }
                },
                0,
            )
            .await;

        assert!(matches!(result, Err(TaskError::TimedOut(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().active_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_cost_ignores_invalid_amounts() {
        let coordinator = RequestCoordinator::new(immediate_config(1)).unwrap();

        coordinator.track_cost(0.5);
        coordinator.track_cost(-1.0);
        coordinator.track_cost(f64::NAN);

        assert_eq!(coordinator.stats().total_cost, 0.5);
    }
}
