pub mod marking_ctx;
pub mod marking_flow;

pub use marking_ctx::MarkingCtx;
pub use marking_flow::{MarkingFlow, GRADING_PRIORITY, OCR_PRIORITY};
