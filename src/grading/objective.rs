//! 客观题评分函数
//!
//! 纯函数，不依赖任何外部状态

use std::collections::BTreeSet;

use serde::Serialize;

use super::parse::normalize;

/// 单题得分
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradeOutcome {
    pub awarded: f64,
    pub max_marks: f64,
}

impl GradeOutcome {
    pub fn full(max_marks: f64) -> Self {
        Self {
            awarded: max_marks,
            max_marks,
        }
    }

    pub fn zero(max_marks: f64) -> Self {
        Self {
            awarded: 0.0,
            max_marks,
        }
    }

    pub fn is_full_marks(&self) -> bool {
        self.awarded >= self.max_marks
    }
}

/// 选择题评分
///
/// 选项比较忽略大小写和首尾空白。完全一致得满分；
/// 开启部分得分时，选了错误选项得 0 分，否则按选对的比例给分。
pub fn grade_multiple_choice(
    selected: &[String],
    correct: &[String],
    marks: f64,
    partial_credit: bool,
) -> GradeOutcome {
    let selected: BTreeSet<String> = selected
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    let correct: BTreeSet<String> = correct
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if correct.is_empty() || selected.is_empty() {
        return GradeOutcome::zero(marks);
    }

    if selected == correct {
        return GradeOutcome::full(marks);
    }

    if !partial_credit || !selected.is_subset(&correct) {
        return GradeOutcome::zero(marks);
    }

    let hits = selected.len() as f64;
    GradeOutcome {
        awarded: marks * hits / correct.len() as f64,
        max_marks: marks,
    }
}

/// 判断题评分
pub fn grade_true_false(answer: bool, correct: bool, marks: f64) -> GradeOutcome {
    if answer == correct {
        GradeOutcome::full(marks)
    } else {
        GradeOutcome::zero(marks)
    }
}

/// 单空填空题评分：规范化后的作答属于可接受答案集合即得满分
pub fn grade_fill_blank(
    answer: &str,
    accepted: &[String],
    case_sensitive: bool,
    marks: f64,
) -> GradeOutcome {
    let answer = normalize(answer, case_sensitive);
    if answer.is_empty() {
        return GradeOutcome::zero(marks);
    }

    let matched = accepted
        .iter()
        .any(|candidate| normalize(candidate, case_sensitive) == answer);

    if matched {
        GradeOutcome::full(marks)
    } else {
        GradeOutcome::zero(marks)
    }
}

/// 多空填空题评分
///
/// 每空独立判断；开启部分得分时按答对的空数比例给分，否则须全部答对
pub fn grade_fill_blanks(
    answers: &[String],
    blanks: &[Vec<String>],
    case_sensitive: bool,
    marks: f64,
    partial_credit: bool,
) -> GradeOutcome {
    if blanks.is_empty() {
        return GradeOutcome::zero(marks);
    }

    let correct = blanks
        .iter()
        .enumerate()
        .filter(|(i, accepted)| {
            answers
                .get(*i)
                .map(|answer| grade_fill_blank(answer, accepted, case_sensitive, 1.0).is_full_marks())
                .unwrap_or(false)
        })
        .count();

    if correct == blanks.len() {
        GradeOutcome::full(marks)
    } else if partial_credit {
        GradeOutcome {
            awarded: marks * correct as f64 / blanks.len() as f64,
            max_marks: marks,
        }
    } else {
        GradeOutcome::zero(marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_multiple_choice_exact() {
        let correct = strings(&["A", "C"]);
        assert_eq!(
            grade_multiple_choice(&strings(&["c", " a "]), &correct, 4.0, false),
            GradeOutcome::full(4.0)
        );
        assert_eq!(
            grade_multiple_choice(&strings(&["A"]), &correct, 4.0, false),
            GradeOutcome::zero(4.0)
        );
    }

    #[test]
    fn test_multiple_choice_partial_credit() {
        let correct = strings(&["A", "B", "D", "E"]);
        let outcome = grade_multiple_choice(&strings(&["A", "D"]), &correct, 4.0, true);
        assert_eq!(outcome.awarded, 2.0);

        // 选了错误选项不得分
        let outcome = grade_multiple_choice(&strings(&["A", "C"]), &correct, 4.0, true);
        assert_eq!(outcome.awarded, 0.0);
    }

    #[test]
    fn test_multiple_choice_empty_selection() {
        let outcome = grade_multiple_choice(&[], &strings(&["A"]), 2.0, true);
        assert_eq!(outcome.awarded, 0.0);
    }

    #[test]
    fn test_true_false() {
        assert!(grade_true_false(true, true, 1.0).is_full_marks());
        assert_eq!(grade_true_false(false, true, 1.0).awarded, 0.0);
    }

    #[test]
    fn test_fill_blank_case_handling() {
        let accepted = strings(&["Photosynthesis", "光合作用"]);
        assert!(grade_fill_blank(" photosynthesis ", &accepted, false, 2.0).is_full_marks());
        assert_eq!(grade_fill_blank("photosynthesis", &accepted, true, 2.0).awarded, 0.0);
        assert!(grade_fill_blank("光合作用", &accepted, true, 2.0).is_full_marks());
        assert_eq!(grade_fill_blank("", &accepted, false, 2.0).awarded, 0.0);
    }

    #[test]
    fn test_fill_blanks_partial() {
        let blanks = vec![strings(&["氧气", "O2"]), strings(&["二氧化碳", "CO2"])];

        let all = grade_fill_blanks(&strings(&["o2", "二氧化碳"]), &blanks, false, 4.0, false);
        assert!(all.is_full_marks());

        let half = grade_fill_blanks(&strings(&["O2", "水"]), &blanks, false, 4.0, true);
        assert_eq!(half.awarded, 2.0);

        let strict = grade_fill_blanks(&strings(&["O2"]), &blanks, false, 4.0, false);
        assert_eq!(strict.awarded, 0.0);
    }
}
