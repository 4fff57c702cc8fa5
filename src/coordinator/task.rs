//! 任务结果类型：失败分类、任务错误、任务句柄

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 下游暂时不可用（限流、网络抖动），退避后重试
    Retryable,
    /// 请求本身有问题（参数错误、鉴权失败），立即返回给调用方
    Terminal,
}

/// 由任务的错误类型实现，决定协调器是否自动重试
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;

    fn is_retryable(&self) -> bool {
        self.failure_kind() == FailureKind::Retryable
    }
}

/// 任务的最终失败结果
///
/// 总是作为普通返回值交给入队的调用方，不会影响其他任务
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// 不可重试的失败，首次出现即返回
    #[error("任务失败: {0}")]
    Failed(#[source] E),

    /// 每次都是可重试失败，重试次数耗尽
    #[error("共尝试 {attempts} 次后仍失败: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: E,
    },

    /// 单次尝试超过配置的超时时间
    #[error("任务执行超时 ({0:?})")]
    TimedOut(Duration),

    /// 任务内部 panic
    #[error("任务执行时发生 panic: {0}")]
    Panicked(String),

    /// 协调器已关闭，任务未被接收
    #[error("协调器已关闭，不再接受新任务")]
    ShutDown,
}

impl<E> TaskError<E> {
    /// 取出底层错误（如果有）
    pub fn into_inner(self) -> Option<E> {
        match self {
            TaskError::Failed(e) | TaskError::RetriesExhausted { last_error: e, .. } => Some(e),
            _ => None,
        }
    }

    /// 底层错误的引用（如果有）
    pub fn inner(&self) -> Option<&E> {
        match self {
            TaskError::Failed(e) | TaskError::RetriesExhausted { last_error: e, .. } => Some(e),
            _ => None,
        }
    }
}

/// `enqueue` 返回的任务句柄
///
/// 任务在入队时已交给 tokio 运行时执行，句柄只负责取回结果
pub struct TaskHandle<T, E> {
    state: HandleState<T, E>,
}

enum HandleState<T, E> {
    Running(JoinHandle<Result<T, TaskError<E>>>),
    Rejected(Option<TaskError<E>>),
}

impl<T, E> TaskHandle<T, E> {
    pub(crate) fn running(handle: JoinHandle<Result<T, TaskError<E>>>) -> Self {
        Self {
            state: HandleState::Running(handle),
        }
    }

    pub(crate) fn rejected(error: TaskError<E>) -> Self {
        Self {
            state: HandleState::Rejected(Some(error)),
        }
    }
}

// 不对内部字段做结构化 pin，JoinHandle 本身是 Unpin
impl<T, E> Unpin for TaskHandle<T, E> {}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Running(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(join_error)) if join_error.is_cancelled() => {
                    Poll::Ready(Err(TaskError::ShutDown))
                }
                Poll::Ready(Err(join_error)) => {
                    Poll::Ready(Err(TaskError::Panicked(join_error.to_string())))
                }
                Poll::Pending => Poll::Pending,
            },
            HandleState::Rejected(error) => {
                Poll::Ready(Err(error.take().unwrap_or(TaskError::ShutDown)))
            }
        }
    }
}
