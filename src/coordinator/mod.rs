//! 基础设施层（Infrastructure）：请求协调器
//!
//! ## 职责
//!
//! 持有唯一的稀缺资源：对外部 AI / OCR 服务的并发请求名额。
//! 只暴露"提交任务"的能力，不认识试卷、学生或题目。
//!
//! ## 模块划分
//!
//! - `queue` - 优先级队列（二叉堆，同优先级 FIFO）
//! - `policy` - 协调器配置与指数退避
//! - `stats` - 统计快照
//! - `task` - 失败分类、任务错误、任务句柄
//! - `request_coordinator` - 派发、重试、费用统计、关闭

pub mod policy;
pub mod queue;
pub mod request_coordinator;
pub mod stats;
pub mod task;

pub use policy::CoordinatorConfig;
pub use request_coordinator::RequestCoordinator;
pub use stats::CoordinatorStats;
pub use task::{Classify, FailureKind, TaskError, TaskHandle};
