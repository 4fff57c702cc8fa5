pub mod llm_service;
pub mod review_writer;

pub use llm_service::{AiGrade, LlmService, OcrText};
pub use review_writer::ReviewWriter;
