//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评阅和资源生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_marker` - 批量阅卷器
//! - 管理应用生命周期（初始化、运行、关闭协调器）
//! - 批量加载试卷（Vec<Exam>）
//! - 输出全局统计信息
//!
//! ### `exam_marker` - 单份试卷评阅器
//! - 并发评阅单份试卷的所有答卷
//! - 写入评分结果 JSON
//! - 输出单份试卷的统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_marker (处理 Vec<Exam>)
//!     ↓
//! exam_marker (处理 Vec<Submission>)
//!     ↓
//! workflow::MarkingFlow (处理单份答卷)
//!     ↓
//! grading / services (能力层：自动评分 / AI / OCR / 复核清单)
//!     ↓
//! coordinator (基础设施：请求协调器)
//! ```

pub mod batch_marker;
pub mod exam_marker;

// 重新导出主要类型
pub use batch_marker::{App, MarkingStats};
pub use exam_marker::{mark_exam, ExamSummary};
