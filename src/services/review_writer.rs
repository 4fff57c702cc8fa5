//! 人工复核写入服务 - 业务能力层
//!
//! 只负责"把需要人工复核的题目写进 review.txt"，不关心流程

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// 人工复核写入服务
///
/// 职责：
/// - 将 AI / OCR 失败的题目追加写入复核清单
/// - 每次只写一道题
/// - 多个答卷并发写入时逐行串行
pub struct ReviewWriter {
    review_file_path: String,
    write_lock: Mutex<()>,
}

impl ReviewWriter {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            review_file_path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &str {
        &self.review_file_path
    }

    /// 写入一条复核记录
    ///
    /// # 参数
    /// - `exam`: 试卷名称
    /// - `student_id`: 学号
    /// - `question_id`: 题号
    /// - `reason`: 需要复核的原因
    pub fn write(&self, exam: &str, student_id: &str, question_id: &str, reason: &str) -> AppResult<()> {
        debug!(
            "写入复核记录: 试卷 {} | 学生 {} | 题目 {}",
            exam, student_id, question_id
        );

        let line = format!(
            "{} | 试卷 {} | 学生 {} | 题目 {} | 原因: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            exam,
            student_id,
            question_id,
            reason.replace('\n', " ")
        );

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.review_file_path)
            .map_err(|e| AppError::file_write_failed(&self.review_file_path, e))?;

        file.write_all(line.as_bytes())
            .map_err(|e| AppError::file_write_failed(&self.review_file_path, e))?;

        Ok(())
    }
}

impl Default for ReviewWriter {
    fn default() -> Self {
        Self::with_path("review.txt")
    }
}
