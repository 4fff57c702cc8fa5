//! 业务能力层：客观题自动评分
//!
//! - `parse` - 作答文本解析（选项、判断、多空）
//! - `objective` - 选择 / 判断 / 填空评分函数
//!
//! 主观题（简答、作文）不在这里评分，见 `services::llm_service`

pub mod objective;
pub mod parse;

pub use objective::{
    grade_fill_blank, grade_fill_blanks, grade_multiple_choice, grade_true_false, GradeOutcome,
};
pub use parse::{normalize, parse_choice_answer, parse_true_false, split_blanks};

use crate::models::exam::{ExamQuestion, QuestionType};

/// 按题型对作答自动评分
///
/// # 返回
/// 客观题返回得分；主观题返回 `None`，交给 AI 评分
pub fn auto_grade(question: &ExamQuestion, answer: &str) -> Option<GradeOutcome> {
    let marks = question.marks;

    match question.question_type {
        QuestionType::MultipleChoice => {
            let selected = parse_choice_answer(answer);
            let correct: Vec<String> = question
                .answer
                .iter()
                .flat_map(|key| parse_choice_answer(key))
                .collect();
            Some(grade_multiple_choice(
                &selected,
                &correct,
                marks,
                question.partial_credit,
            ))
        }
        QuestionType::TrueFalse => {
            let correct = question.answer.first().and_then(|key| parse_true_false(key));
            match (parse_true_false(answer), correct) {
                (Some(answer), Some(correct)) => Some(grade_true_false(answer, correct, marks)),
                _ => Some(GradeOutcome::zero(marks)),
            }
        }
        QuestionType::FillBlank if !question.blanks.is_empty() => Some(grade_fill_blanks(
            &split_blanks(answer),
            &question.blanks,
            question.case_sensitive,
            marks,
            question.partial_credit,
        )),
        QuestionType::FillBlank => Some(grade_fill_blank(
            answer,
            &question.answer,
            question.case_sensitive,
            marks,
        )),
        QuestionType::ShortAnswer | QuestionType::Essay => None,
    }
}
