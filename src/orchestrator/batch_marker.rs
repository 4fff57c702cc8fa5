//! 批量阅卷器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量试卷的评阅和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志文件头、创建请求协调器和评分流程
//! 2. **批量加载**：扫描并加载所有待评阅的试卷（`Vec<Exam>`）
//! 3. **逐份评阅**：委托 `exam_marker` 评阅单份试卷
//! 4. **资源管理**：唯一创建协调器的地方，结束时关闭并等待在途请求
//! 5. **全局统计**：汇总所有试卷的评阅结果与请求费用

use anyhow::{Context, Result};
use tracing::{error, warn};

use crate::config::Config;
use crate::coordinator::RequestCoordinator;
use crate::models::exam::Exam;
use crate::orchestrator::exam_marker::{self, ExamSummary};
use crate::utils::logging::{init_log_file, log_exams_loaded, log_startup, print_final_stats};
use crate::workflow::MarkingFlow;

/// 应用主结构
pub struct App {
    config: Config,
    coordinator: RequestCoordinator,
    flow: MarkingFlow,
}

/// 全部试卷的评阅统计
#[derive(Debug, Default)]
pub struct MarkingStats {
    pub exams: usize,
    pub failed_exams: usize,
    pub students: usize,
    pub reviews: usize,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(config.max_concurrent_requests, &config.llm_model_name);

        if config.llm_api_key.is_empty() {
            warn!("⚠️ 未设置 LLM_API_KEY，主观题和手写作答将全部进入人工复核");
        }

        let coordinator = RequestCoordinator::new(config.coordinator_config())
            .context("请求协调器配置不合法")?;
        let flow = MarkingFlow::new(&config, coordinator.clone());

        Ok(Self {
            config,
            coordinator,
            flow,
        })
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// 运行应用主逻辑
    ///
    /// 结束时关闭协调器并等待所有在途请求完成
    pub async fn run(&self) -> Result<MarkingStats> {
        let result = self.run_inner().await;
        self.coordinator.shutdown().await;
        result
    }

    async fn run_inner(&self) -> Result<MarkingStats> {
        let exams = self.load_exams().await?;

        if exams.is_empty() {
            warn!("⚠️ 没有找到待评阅的试卷文件，程序结束");
            return Ok(MarkingStats::default());
        }

        let total_submissions = exams.iter().map(|e| e.submissions.len()).sum();
        log_exams_loaded(exams.len(), total_submissions);

        let stats = self.mark_all_exams(&exams).await;

        print_final_stats(
            stats.exams,
            stats.students,
            stats.reviews,
            &self.coordinator.stats(),
            &self.config.output_log_file,
        );

        Ok(stats)
    }

    /// 加载试卷
    async fn load_exams(&self) -> Result<Vec<Exam>> {
        tracing::info!("\n📁 正在扫描待评阅的试卷...");
        crate::models::load_all_exams(&self.config.exam_folder)
            .await
            .with_context(|| format!("无法加载试卷目录: {}", self.config.exam_folder))
    }

    /// 逐份评阅所有试卷
    async fn mark_all_exams(&self, exams: &[Exam]) -> MarkingStats {
        let mut stats = MarkingStats::default();
        let total = exams.len();

        for (index, exam) in exams.iter().enumerate() {
            let exam_index = index + 1;
            match exam_marker::mark_exam(&self.flow, exam, exam_index, total, &self.config).await {
                Ok(ExamSummary {
                    students, reviews, ..
                }) => {
                    stats.exams += 1;
                    stats.students += students;
                    stats.reviews += reviews;
                }
                Err(e) => {
                    error!("[试卷 {}] ❌ 评阅过程中发生错误: {:#}", exam_index, e);
                    stats.failed_exams += 1;
                }
            }
        }

        stats
    }
}
