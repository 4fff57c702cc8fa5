//! # Auto Marking
//!
//! 一个用于试卷自动评阅的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `coordinator/` - 持有稀缺资源（外部 AI 请求名额），只暴露"提交任务"的能力
//! - `RequestCoordinator` - 并发上限、派发间隔、指数退避重试、费用统计
//!
//! ### ② 业务能力层（Capabilities）
//! - `grading/` - 客观题评分纯函数（选择 / 判断 / 填空）
//! - `services/` - 描述"我能做什么"，只处理单道题
//! - `LlmService` - AI 评分与 OCR 能力
//! - `ReviewWriter` - 写复核清单能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份答卷"的完整评分流程
//! - `MarkingCtx` - 上下文封装（试卷 + 学生）
//! - `MarkingFlow` - 流程编排（OCR → 自动评分 → AI 评分 → 复核兜底）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_marker` - 批量阅卷器，管理资源和生命周期
//! - `orchestrator/exam_marker` - 单份试卷评阅器，并发评阅所有答卷
//!
//! ## 模块结构

pub mod config;
pub mod coordinator;
pub mod error;
pub mod grading;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use coordinator::{
    Classify, CoordinatorConfig, CoordinatorStats, FailureKind, RequestCoordinator, TaskError,
    TaskHandle,
};
pub use error::{AppError, AppResult};
pub use models::{Exam, MarkResult, SubmissionReport};
pub use orchestrator::App;
pub use workflow::{MarkingCtx, MarkingFlow};
