//! 评分上下文
//!
//! 封装"我正在批哪份试卷的哪个学生"这一信息

use std::fmt::Display;

/// 评分上下文
#[derive(Debug, Clone)]
pub struct MarkingCtx {
    /// 试卷名称
    pub exam_name: String,

    /// 试卷序号（仅用于日志显示）
    pub exam_index: usize,

    /// 学号
    pub student_id: String,
}

impl MarkingCtx {
    pub fn new(exam_name: impl Into<String>, exam_index: usize, student_id: impl Into<String>) -> Self {
        Self {
            exam_name: exam_name.into(),
            exam_index,
            student_id: student_id.into(),
        }
    }
}

impl Display for MarkingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[试卷 {} 学生#{}]", self.exam_index, self.student_id)
    }
}
