//! 单份试卷评阅器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责评阅单份试卷的所有答卷，是试卷级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **并发评阅**：同一试卷的所有答卷同时提交，外部请求由协调器限流
//! 2. **流程复用**：所有答卷共用同一个 `MarkingFlow`
//! 3. **结果输出**：写入 `<输出目录>/<试卷名>_results.json`
//! 4. **统计输出**：平均分、需复核题数

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::info;

use crate::config::Config;
use crate::models::exam::Exam;
use crate::models::report::{ExamReport, SubmissionReport};
use crate::utils::logging::{log_exam_complete, log_exam_start};
use crate::workflow::{MarkingCtx, MarkingFlow};

/// 单份试卷的评阅统计
#[derive(Debug, Default, Clone)]
pub struct ExamSummary {
    pub students: usize,
    pub reviews: usize,
    pub average: f64,
    pub report_path: Option<PathBuf>,
}

/// 评阅单份试卷
///
/// # 参数
/// - `flow`: 评分流程
/// - `exam`: 试卷数据（含答卷）
/// - `exam_index`: 试卷序号（用于日志）
/// - `total_exams`: 试卷总数（用于日志）
/// - `config`: 配置
pub async fn mark_exam(
    flow: &MarkingFlow,
    exam: &Exam,
    exam_index: usize,
    total_exams: usize,
    config: &Config,
) -> Result<ExamSummary> {
    log_exam_start(exam_index, total_exams, &exam.name, exam.submissions.len());

    let reports: Vec<SubmissionReport> = join_all(exam.submissions.iter().map(|submission| {
        let ctx = MarkingCtx::new(&exam.name, exam_index, &submission.student_id);
        async move {
            let report = flow.mark_submission(exam, submission, &ctx).await;
            info!(
                "{} ✓ {} 得分 {:.1}/{}",
                ctx, submission.student_name, report.total_awarded, report.total_marks
            );
            report
        }
    }))
    .await;

    let summary = summarize(&reports);

    let report = ExamReport {
        exam: exam.name.clone(),
        subject: exam.subject.clone(),
        marked_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        students: reports,
    };
    let report_path = write_report(&report, &config.output_folder)
        .with_context(|| format!("写入试卷 {} 的评分结果失败", exam.name))?;
    info!("[试卷 {}] 📝 评分结果已写入: {}", exam_index, report_path.display());

    log_exam_complete(
        exam_index,
        summary.students,
        summary.average,
        exam.total_marks(),
        summary.reviews,
    );

    Ok(ExamSummary {
        report_path: Some(report_path),
        ..summary
    })
}

fn summarize(reports: &[SubmissionReport]) -> ExamSummary {
    let students = reports.len();
    let reviews = reports.iter().map(SubmissionReport::review_count).sum();
    let average = if students == 0 {
        0.0
    } else {
        reports.iter().map(|r| r.total_awarded).sum::<f64>() / students as f64
    };

    ExamSummary {
        students,
        reviews,
        average,
        report_path: None,
    }
}

/// 把评分报告写成 JSON 文件
fn write_report(report: &ExamReport, output_folder: &str) -> Result<PathBuf> {
    let folder = Path::new(output_folder);
    std::fs::create_dir_all(folder)
        .with_context(|| format!("无法创建输出目录: {}", folder.display()))?;

    let path = folder.join(format!("{}_results.json", sanitize_file_name(&report.exam)));
    let json = serde_json::to_string_pretty(report).context("评分结果序列化失败")?;
    std::fs::write(&path, json).with_context(|| format!("无法写入文件: {}", path.display()))?;

    Ok(path)
}

/// 把试卷名中不能出现在文件名里的字符替换为下划线
fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        "exam".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::MarkResult;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("2025/期中: 数学"), "2025_期中_ 数学");
        assert_eq!(sanitize_file_name("   "), "exam");
    }

    #[test]
    fn test_summarize() {
        let reports = vec![
            SubmissionReport::new("s1", "甲", vec![MarkResult::unanswered("q1", 4.0)]),
            SubmissionReport::new(
                "s2",
                "乙",
                vec![MarkResult::needs_review("q1", 4.0, "AI 评分失败")],
            ),
        ];

        let summary = summarize(&reports);
        assert_eq!(summary.students, 2);
        assert_eq!(summary.reviews, 1);
        assert_eq!(summary.average, 0.0);
        assert!(summarize(&[]).report_path.is_none());
    }
}
