pub mod exam;
pub mod loaders;
pub mod report;

pub use exam::{Exam, ExamQuestion, QuestionType, StudentAnswer, Submission};
pub use loaders::{load_all_exams, load_exam};
pub use report::{ExamReport, MarkResult, MarkingMethod, SubmissionReport};
