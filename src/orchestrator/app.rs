//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志文件、外部协作方、策略注册表、一致性缓存
//! 2. **批量加载**：扫描提交目录中的 TOML 文件
//! 3. **任务调度**：每份提交一个评分任务，订阅状态流并记录事件
//! 4. **全局统计**：汇总所有任务的终态

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{
    DataStore, HttpUrlFetcher, InMemoryStore, LlmJudgmentClient, LocalFileExtractor, StaticLocalizer,
};
use crate::config::Config;
use crate::models::{load_all_submissions, JobEventType, JobStatus, SubmissionFile, SubmissionRequest};
use crate::orchestrator::job_manager::GradingJobManager;
use crate::orchestrator::status_stream::JobStatusStream;
use crate::orchestrator::submission_processor::SubmissionProcessor;
use crate::services::{AuditRecorder, ConsistencyService};
use crate::strategies::{StrategyDeps, StrategyRegistry};
use crate::utils::logging::{init_log_file, log_startup, log_submissions_loaded, print_final_stats};
use crate::workflow::ResponseFlow;

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<InMemoryStore>,
    consistency: Arc<ConsistencyService>,
    manager: Arc<GradingJobManager>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;
        log_startup(config.max_concurrent_jobs, config.max_concurrent_responses);

        if config.llm_api_key.is_empty() {
            warn!("⚠️ 未配置 LLM_API_KEY，文本 / 文件 / 链接类题目的评判会失败");
        }

        let store = Arc::new(InMemoryStore::new());
        let data_store: Arc<dyn DataStore> = store.clone();

        let deps = StrategyDeps {
            judgment: Arc::new(LlmJudgmentClient::new(&config)),
            extractor: Arc::new(LocalFileExtractor::new(&config.upload_folder)),
            fetcher: Arc::new(HttpUrlFetcher::new(&config)?),
            localizer: Arc::new(StaticLocalizer::new()),
        };
        let registry = Arc::new(StrategyRegistry::with_defaults(&deps));
        info!("✓ 已注册 {} 个评分策略", registry.len());

        let consistency = Arc::new(ConsistencyService::new(
            config.consistency.clone(),
            data_store.clone(),
        ));
        consistency.start_sweeper();

        let flow = Arc::new(ResponseFlow::new(
            registry,
            data_store.clone(),
            consistency.clone(),
            Arc::new(AuditRecorder::new(data_store.clone())),
            deps.localizer.clone(),
            config.verbose_logging,
        ));
        let processor = Arc::new(SubmissionProcessor::new(flow, config.max_concurrent_responses));
        let stream = Arc::new(JobStatusStream::new(data_store.clone(), config.stream.clone()));
        let manager = Arc::new(GradingJobManager::new(
            data_store,
            processor,
            stream,
            config.max_concurrent_jobs,
        ));

        Ok(Self {
            config,
            store,
            consistency,
            manager,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        info!("\n📁 正在扫描待评分的提交...");
        let files = load_all_submissions(&self.config.submission_folder).await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待评分的TOML文件，程序结束");
            return Ok(());
        }

        let total = files.len();
        log_submissions_loaded(total);

        let runs = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| self.grade_file(index + 1, file));
        let finished = join_all(runs).await;

        let success = finished.iter().filter(|s| **s == Some(JobStatus::Completed)).count();
        let failed = total - success;

        let stats = self.consistency.cache_stats().await;
        info!(
            "一致性缓存: {} 道题, {} 条记录",
            stats.question_keys, stats.total_records
        );
        self.consistency.shutdown().await;

        print_final_stats(success, failed, total, &self.config.output_log_file);
        Ok(())
    }

    /// 评分一份提交文件，返回任务终态
    async fn grade_file(&self, index: usize, file: SubmissionFile) -> Option<JobStatus> {
        let source = file.file_path.clone().unwrap_or_default();
        let submission = self.seed(file).await;

        let job = match self.manager.create_job(&submission).await {
            Ok(job) => job,
            Err(e) => {
                error!("[提交 {}] ❌ 无法创建评分任务: {}", index, e);
                return None;
            }
        };
        info!("[提交 {}] {} → 任务 {}", index, source, job.id);

        let mut subscription = self.manager.stream().subscribe(&job.id);
        let running = self.manager.start_job(&job.id, submission);

        let mut last_status = None;
        while let Some(event) = subscription.next().await {
            match event.event_type {
                JobEventType::Update => info!(
                    "[提交 {}] {}% {}",
                    index, event.data.percentage, event.data.progress
                ),
                JobEventType::Heartbeat => {}
                JobEventType::Error => {
                    warn!("[提交 {}] ⚠️ 状态流中断: {}", index, event.data.progress);
                    break;
                }
                JobEventType::Finalize => {
                    info!("[提交 {}] 🏁 {}", index, event.data.progress);
                    last_status = event.data.status;
                    break;
                }
            }
        }

        if last_status.is_some() {
            return last_status;
        }

        // 状态流中断时任务仍在运行，等它写完终态再查询任务行
        if let Err(e) = running.await {
            error!("[提交 {}] ❌ 评分任务异常退出: {}", index, e);
        }
        self.manager.get_job(&job.id).await.ok().map(|j| j.status)
    }

    /// 把文件中的题目写入存储；作者预览则作为作答的题目覆盖
    async fn seed(&self, file: SubmissionFile) -> SubmissionRequest {
        let SubmissionFile {
            questions,
            mut submission,
            ..
        } = file;

        if submission.is_author_preview() {
            for response in &mut submission.responses {
                if response.question_override.is_none() {
                    response.question_override = questions
                        .iter()
                        .find(|q| q.id == response.question_id)
                        .cloned();
                }
            }
        } else if let Some(attempt_id) = submission.attempt_id {
            for question in questions {
                self.store.insert_attempt_question(attempt_id, question).await;
            }
        }
        submission
    }
}
