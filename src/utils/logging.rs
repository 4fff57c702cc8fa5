//! 日志工具模块
//!
//! 初始化 tracing 订阅器，并提供日志格式化和输出的辅助函数

use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::coordinator::CoordinatorStats;
use crate::error::{AppError, AppResult};

/// 初始化日志订阅器
///
/// 日志级别由 `RUST_LOG` 控制，默认 `info`；`verbose` 为真时默认 `debug`。
/// 重复调用是安全的（后续调用不生效）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化运行日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n阅卷日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::file_write_failed(log_file_path, e))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(max_concurrent: usize, model: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动阅卷模式");
    info!("📊 最大并发请求数: {}", max_concurrent);
    info!("🤖 评分模型: {}", model);
    info!("{}", "=".repeat(60));
}

/// 记录试卷加载信息
pub fn log_exams_loaded(total_exams: usize, total_submissions: usize) {
    info!("✓ 找到 {} 份试卷，共 {} 份答卷", total_exams, total_submissions);
    info!("💡 逐份试卷处理，同一试卷的答卷并发评分\n");
}

/// 记录单份试卷开始
pub fn log_exam_start(exam_index: usize, total_exams: usize, name: &str, submissions: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始评阅第 {}/{} 份试卷: {}", exam_index, total_exams, name);
    info!("📄 答卷数量: {}", submissions);
    info!("{}", "=".repeat(60));
}

/// 记录单份试卷完成
pub fn log_exam_complete(exam_index: usize, students: usize, average: f64, total_marks: f64, reviews: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 份试卷完成: {} 名学生，平均分 {:.1}/{}",
        exam_index, students, average, total_marks
    );
    if reviews > 0 {
        info!("⚠️ 需人工复核: {} 道", reviews);
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(
    exams: usize,
    students: usize,
    reviews: usize,
    coordinator: &CoordinatorStats,
    log_file_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部阅卷完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 试卷: {} 份 / 答卷: {} 份", exams, students);
    info!("⚠️ 需人工复核: {} 道", reviews);
    info!("🤖 AI 请求: {}", coordinator);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
