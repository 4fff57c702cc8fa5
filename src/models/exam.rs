use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AppResult, GradingError};
use crate::grading::parse_true_false;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    FillBlank,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    /// 客观题可以直接对照标准答案评分
    pub fn is_objective(&self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoice | QuestionType::TrueFalse | QuestionType::FillBlank
        )
    }
}

/// 试卷中的一道题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub prompt: String,
    pub marks: f64,
    /// 选择题：正确选项；判断题：`"true"` / `"false"`；填空题：可接受答案；主观题：参考答案
    #[serde(default)]
    pub answer: Vec<String>,
    /// 多空填空题：每个空的可接受答案
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blanks: Vec<Vec<String>>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub partial_credit: bool,
    /// 主观题评分细则
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,
}

/// 学生对一道题的作答
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// 手写作答的扫描图片，需要先 OCR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl StudentAnswer {
    /// 是否需要 OCR：只有图片、没有文字
    pub fn needs_ocr(&self) -> bool {
        self.image_url.is_some() && self.answer_text().is_none()
    }

    /// 非空的作答文字
    pub fn answer_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// 一个学生的答卷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub answers: Vec<StudentAnswer>,
}

impl Submission {
    pub fn answer_for(&self, question_id: &str) -> Option<&StudentAnswer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }
}

/// 试卷：题目 + 标准答案 + 学生答卷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub name: String,
    #[serde(default)]
    pub subject: String,
    pub questions: Vec<ExamQuestion>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl Exam {
    /// 试卷总分
    pub fn total_marks(&self) -> f64 {
        self.questions.iter().map(|q| q.marks).sum()
    }

    /// 校验试卷数据：题号唯一、分值合法、客观题有标准答案
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = HashSet::new();

        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(GradingError::DuplicateQuestion {
                    exam: self.name.clone(),
                    question_id: question.id.clone(),
                }
                .into());
            }

            if !question.marks.is_finite() || question.marks <= 0.0 {
                return Err(GradingError::InvalidMarks {
                    exam: self.name.clone(),
                    question_id: question.id.clone(),
                    marks: question.marks,
                }
                .into());
            }

            if question.question_type.is_objective()
                && question.answer.is_empty()
                && question.blanks.is_empty()
            {
                return Err(GradingError::MissingAnswerKey {
                    exam: self.name.clone(),
                    question_id: question.id.clone(),
                }
                .into());
            }

            if question.question_type == QuestionType::TrueFalse {
                let key = question.answer.first().map(String::as_str).unwrap_or_default();
                if parse_true_false(key).is_none() {
                    return Err(GradingError::InvalidTrueFalseKey {
                        exam: self.name.clone(),
                        question_id: question.id.clone(),
                        answer: key.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}
