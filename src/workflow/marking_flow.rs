//! 答卷评分流程 - 流程层
//!
//! 核心职责：定义"一份答卷"的完整评分流程
//!
//! 流程顺序：
//! 1. 只有图片的作答 → OCR（经协调器批量提交）
//! 2. 客观题 → 对照标准答案自动评分
//! 3. 主观题 → AI 评分（经协调器批量提交）
//! 4. AI / OCR 失败 → 记 0 分并写入复核清单（兜底）

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinator::{RequestCoordinator, TaskError};
use crate::error::AppError;
use crate::grading::auto_grade;
use crate::models::exam::{Exam, ExamQuestion, Submission};
use crate::models::report::{MarkResult, MarkingMethod, SubmissionReport};
use crate::services::{LlmService, ReviewWriter};
use crate::utils::logging::truncate_text;
use crate::workflow::marking_ctx::MarkingCtx;

/// OCR 请求优先级：识别结果是后续评分的前提，先于评分请求派发
pub const OCR_PRIORITY: i32 = 10;
/// AI 评分请求优先级
pub const GRADING_PRIORITY: i32 = 5;

/// 答卷评分流程
///
/// - 编排单份答卷的评分顺序
/// - 决定哪些题走自动评分、哪些走 AI、何时兜底
/// - 所有外部请求都经由协调器，流程本身不控制并发
/// - 费用由这里上报给协调器：成功的调用按返回的用量计费；
///   拿到了输出却无法使用的失败（空响应、分数解析失败）同样计费；
///   限流和网络故障不产生费用
pub struct MarkingFlow {
    coordinator: RequestCoordinator,
    llm_service: Arc<LlmService>,
    review_writer: Arc<ReviewWriter>,
    verbose_logging: bool,
}

impl MarkingFlow {
    /// 创建新的评分流程
    pub fn new(config: &Config, coordinator: RequestCoordinator) -> Self {
        Self::with_services(
            coordinator,
            Arc::new(LlmService::new(config)),
            Arc::new(ReviewWriter::with_path(&config.review_file)),
            config.verbose_logging,
        )
    }

    pub fn with_services(
        coordinator: RequestCoordinator,
        llm_service: Arc<LlmService>,
        review_writer: Arc<ReviewWriter>,
        verbose_logging: bool,
    ) -> Self {
        Self {
            coordinator,
            llm_service,
            review_writer,
            verbose_logging,
        }
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// 为一份答卷评分
    ///
    /// 单题失败不会影响其他题目，结果顺序与试卷题目顺序一致
    pub async fn mark_submission(
        &self,
        exam: &Exam,
        submission: &Submission,
        ctx: &MarkingCtx,
    ) -> SubmissionReport {
        let mut results: Vec<Option<MarkResult>> = vec![None; exam.questions.len()];
        let mut texts: Vec<Option<String>> = exam
            .questions
            .iter()
            .map(|q| {
                submission
                    .answer_for(&q.id)
                    .and_then(|a| a.answer_text())
                    .map(str::to_string)
            })
            .collect();

        // ========== 1. OCR ==========
        let ocr_jobs: Vec<(usize, String)> = exam
            .questions
            .iter()
            .enumerate()
            .filter_map(|(index, q)| {
                submission
                    .answer_for(&q.id)
                    .filter(|a| a.needs_ocr())
                    .and_then(|a| a.image_url.clone())
                    .map(|url| (index, url))
            })
            .collect();

        if !ocr_jobs.is_empty() {
            info!("{} 🔍 OCR 识别 {} 道手写作答...", ctx, ocr_jobs.len());

            let llm = Arc::clone(&self.llm_service);
            let outcomes = self
                .coordinator
                .batch(ocr_jobs.clone(), OCR_PRIORITY, move |(_, url): (usize, String)| {
                    let llm = Arc::clone(&llm);
                    async move { llm.extract_text(&url).await }
                })
                .await;

            for ((index, _), outcome) in ocr_jobs.into_iter().zip(outcomes) {
                match outcome {
                    Ok(ocr) => {
                        self.coordinator.track_cost(ocr.cost);
                        texts[index] = Some(ocr.text);
                    }
                    Err(e) => {
                        self.track_failure_cost(&e);
                        let question = &exam.questions[index];
                        results[index] = Some(self.review(ctx, question, format!("OCR 失败: {}", e)));
                    }
                }
            }
        }

        // ========== 2. 客观题自动评分，主观题分拣 ==========
        let mut ai_jobs: Vec<(usize, ExamQuestion, String)> = Vec::new();

        for (index, question) in exam.questions.iter().enumerate() {
            if results[index].is_some() {
                continue;
            }

            let Some(text) = texts[index].take() else {
                results[index] = Some(MarkResult::unanswered(&question.id, question.marks));
                continue;
            };

            if self.verbose_logging {
                debug!("{} 题目 {} 作答: {}", ctx, question.id, truncate_text(&text, 40));
            }

            match auto_grade(question, &text) {
                Some(outcome) => {
                    results[index] = Some(MarkResult {
                        question_id: question.id.clone(),
                        awarded: outcome.awarded,
                        max_marks: outcome.max_marks,
                        method: MarkingMethod::Auto,
                        feedback: None,
                    });
                }
                None => ai_jobs.push((index, question.clone(), text)),
            }
        }

        // ========== 3. 主观题 AI 评分 ==========
        if !ai_jobs.is_empty() {
            info!("{} 🤖 AI 评分 {} 道主观题...", ctx, ai_jobs.len());

            let llm = Arc::clone(&self.llm_service);
            let outcomes = self
                .coordinator
                .batch(
                    ai_jobs.clone(),
                    GRADING_PRIORITY,
                    move |(_, question, text): (usize, ExamQuestion, String)| {
                        let llm = Arc::clone(&llm);
                        async move { llm.grade_answer(&question, &text).await }
                    },
                )
                .await;

            for ((index, question, _), outcome) in ai_jobs.into_iter().zip(outcomes) {
                results[index] = Some(match outcome {
                    Ok(grade) => {
                        self.coordinator.track_cost(grade.cost);
                        MarkResult {
                            question_id: question.id.clone(),
                            awarded: grade.score,
                            max_marks: question.marks,
                            method: MarkingMethod::Ai,
                            feedback: grade.feedback,
                        }
                    }
                    Err(e) => {
                        self.track_failure_cost(&e);
                        self.review(ctx, &question, format!("AI 评分失败: {}", e))
                    }
                });
            }
        }

        let results = results
            .into_iter()
            .zip(&exam.questions)
            .map(|(result, question)| {
                result.unwrap_or_else(|| MarkResult::needs_review(&question.id, question.marks, "未评分"))
            })
            .collect();

        SubmissionReport::new(
            &submission.student_id,
            &submission.student_name,
            results,
        )
    }

    fn track_failure_cost(&self, error: &TaskError<AppError>) {
        if let Some(cost) = error.inner().map(AppError::billed_cost).filter(|c| *c > 0.0) {
            self.coordinator.track_cost(cost);
        }
    }

    /// 兜底：记 0 分并写入复核清单
    fn review(&self, ctx: &MarkingCtx, question: &ExamQuestion, reason: String) -> MarkResult {
        warn!("{} ⚠️ 题目 {} 需人工复核: {}", ctx, question.id, reason);

        if let Err(e) = self
            .review_writer
            .write(&ctx.exam_name, &ctx.student_id, &question.id, &reason)
        {
            warn!("{} 写入复核清单失败: {}", ctx, e);
        }

        MarkResult::needs_review(&question.id, question.marks, reason)
    }
}
