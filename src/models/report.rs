use serde::{Deserialize, Serialize};

/// 得分来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingMethod {
    /// 对照标准答案自动评分
    Auto,
    /// AI 辅助评分
    Ai,
    /// 未作答
    Unanswered,
    /// AI / OCR 失败，需人工复核
    NeedsReview,
}

/// 单题评分结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkResult {
    pub question_id: String,
    pub awarded: f64,
    pub max_marks: f64,
    pub method: MarkingMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl MarkResult {
    pub fn unanswered(question_id: impl Into<String>, max_marks: f64) -> Self {
        Self {
            question_id: question_id.into(),
            awarded: 0.0,
            max_marks,
            method: MarkingMethod::Unanswered,
            feedback: None,
        }
    }

    pub fn needs_review(question_id: impl Into<String>, max_marks: f64, reason: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            awarded: 0.0,
            max_marks,
            method: MarkingMethod::NeedsReview,
            feedback: Some(reason.into()),
        }
    }
}

/// 一个学生的评分报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub student_id: String,
    pub student_name: String,
    pub total_awarded: f64,
    pub total_marks: f64,
    pub results: Vec<MarkResult>,
}

impl SubmissionReport {
    pub fn new(
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        results: Vec<MarkResult>,
    ) -> Self {
        let total_awarded = results.iter().map(|r| r.awarded).sum();
        let total_marks = results.iter().map(|r| r.max_marks).sum();
        Self {
            student_id: student_id.into(),
            student_name: student_name.into(),
            total_awarded,
            total_marks,
            results,
        }
    }

    /// 需人工复核的题目数
    pub fn review_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.method == MarkingMethod::NeedsReview)
            .count()
    }
}

/// 一份试卷的评分报告，写入 `<试卷名>_results.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamReport {
    pub exam: String,
    pub subject: String,
    pub marked_at: String,
    pub students: Vec<SubmissionReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_totals() {
        let report = SubmissionReport::new(
            "s1",
            "张三",
            vec![
                MarkResult {
                    question_id: "q1".to_string(),
                    awarded: 2.0,
                    max_marks: 2.0,
                    method: MarkingMethod::Auto,
                    feedback: None,
                },
                MarkResult::unanswered("q2", 3.0),
                MarkResult::needs_review("q3", 5.0, "OCR 失败"),
            ],
        );

        assert_eq!(report.total_awarded, 2.0);
        assert_eq!(report.total_marks, 10.0);
        assert_eq!(report.review_count(), 1);
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&MarkingMethod::NeedsReview).unwrap();
        assert_eq!(json, "\"needs_review\"");
    }
}
