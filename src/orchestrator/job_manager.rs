//! 评分任务管理器 - 编排层
//!
//! ## 职责
//!
//! 把"批改一整份作答"包装成一个持久化的任务：
//!
//! - 创建 `Pending` 任务行
//! - `start_job` 在运行时上启动评分并立即返回
//! - 评分过程中的进度、完成、失败都写回同一行，并广播给状态流
//!
//! 同一任务的写入通过按键加锁串行执行；百分比不回退；终态之后拒绝任何修改。

use futures::FutureExt;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::DataStore;
use crate::error::JobError;
use crate::infrastructure::KeyedMutex;
use crate::models::{GradingJob, JobStatus, JobUpdate, NewGradingJob, SubmissionRequest};
use crate::orchestrator::status_stream::JobStatusStream;
use crate::orchestrator::submission_processor::{ProgressCallback, SubmissionProcessor, SubmissionProgress};

/// 评分开始时的进度
const START_PERCENTAGE: u8 = 0;
/// 题目评分阶段占用的百分比区间
const GRADING_RANGE: (u8, u8) = (20, 90);

/// 评分任务管理器
pub struct GradingJobManager {
    store: Arc<dyn DataStore>,
    processor: Arc<SubmissionProcessor>,
    stream: Arc<JobStatusStream>,
    locks: KeyedMutex,
    job_slots: Arc<Semaphore>,
}

impl GradingJobManager {
    pub fn new(
        store: Arc<dyn DataStore>,
        processor: Arc<SubmissionProcessor>,
        stream: Arc<JobStatusStream>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            store,
            processor,
            stream,
            locks: KeyedMutex::new(),
            job_slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn stream(&self) -> &Arc<JobStatusStream> {
        &self.stream
    }

    /// 为一份提交创建 `Pending` 任务
    pub async fn create_job(&self, submission: &SubmissionRequest) -> Result<GradingJob, JobError> {
        let job = self
            .store
            .create_job(NewGradingJob {
                attempt_id: submission.attempt_id,
                assignment_id: submission.assignment_id,
                user_id: submission.user_id.clone(),
            })
            .await?;
        info!("📝 已创建评分任务 {} (作业 #{})", job.id, job.assignment_id);
        Ok(job)
    }

    /// 在后台启动评分，立即返回
    ///
    /// 没有订阅方时任务照常跑完并写入终态
    pub fn start_job(self: &Arc<Self>, job_id: &str, submission: SubmissionRequest) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let _slot = manager.job_slots.clone().acquire_owned().await.ok();
            if let Err(e) = manager.run_job(&job_id, &submission).await {
                error!("❌ 评分任务 {} 状态写入失败: {}", job_id, e);
            }
        })
    }

    /// 同步执行一个任务直到终态
    pub async fn run_job(
        self: &Arc<Self>,
        job_id: &str,
        submission: &SubmissionRequest,
    ) -> Result<GradingJob, JobError> {
        self.apply(
            job_id,
            JobUpdate::progress(JobStatus::Processing, "开始评分", START_PERCENTAGE),
        )
        .await?;

        let callback = self.progress_callback(job_id);
        match self.processor.process(submission, Some(callback)).await {
            Ok(result) => {
                let value = serde_json::to_value(&result).unwrap_or_default();
                self.complete_job(job_id, value).await
            }
            Err(e) => self.fail_job(job_id, &e.to_string()).await,
        }
    }

    fn progress_callback(self: &Arc<Self>, job_id: &str) -> ProgressCallback {
        let manager = Arc::downgrade(self);
        let job_id = job_id.to_string();
        Arc::new(move |progress: SubmissionProgress| {
            let manager = manager.clone();
            let job_id = job_id.clone();
            async move {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                let message = format!("已评分 {}/{} 道题", progress.completed, progress.total);
                let percentage = grading_percentage(progress.completed, progress.total);
                if let Err(e) = manager.update_progress(&job_id, &message, percentage).await {
                    warn!("⚠️ 任务 {} 进度更新失败: {}", job_id, e);
                }
            }
            .boxed()
        })
    }

    /// 写入中间进度（状态保持 `Processing`）
    pub async fn update_progress(
        &self,
        job_id: &str,
        message: &str,
        percentage: u8,
    ) -> Result<GradingJob, JobError> {
        self.apply(
            job_id,
            JobUpdate::progress(JobStatus::Processing, message, percentage),
        )
        .await
    }

    /// 写入 `Completed` 与结果
    pub async fn complete_job(&self, job_id: &str, result: JsonValue) -> Result<GradingJob, JobError> {
        let job = self
            .apply(
                job_id,
                JobUpdate::progress(JobStatus::Completed, "评分完成", 100).with_result(result),
            )
            .await?;
        info!("✅ 评分任务 {} 已完成", job_id);
        Ok(job)
    }

    /// 写入 `Failed` 与错误信息
    pub async fn fail_job(&self, job_id: &str, message: &str) -> Result<GradingJob, JobError> {
        let job = self
            .apply(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Failed),
                    progress: Some(format!("评分失败: {}", message)),
                    percentage: None,
                    result: Some(json!({ "error": message })),
                },
            )
            .await?;
        error!("❌ 评分任务 {} 失败: {}", job_id, message);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<GradingJob, JobError> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// 在任务锁内校验状态转移、保持百分比不回退，写库后广播
    async fn apply(&self, job_id: &str, mut update: JobUpdate) -> Result<GradingJob, JobError> {
        let _guard = self.locks.lock(job_id).await;

        let current = self.get_job(job_id).await?;
        if let Some(next) = update.status {
            if !current.status.can_transition_to(next) {
                return Err(JobError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: current.status.to_string(),
                    to: next.to_string(),
                });
            }
        }
        if let Some(percentage) = update.percentage {
            update.percentage = Some(percentage.max(current.percentage));
        }

        let job = self.store.update_job(job_id, update).await?;
        self.stream.publish(&job);
        Ok(job)
    }
}

/// 已完成题数映射到 20%..90%
fn grading_percentage(completed: usize, total: usize) -> u8 {
    let (low, high) = GRADING_RANGE;
    if total == 0 {
        return high;
    }
    let span = (high - low) as usize;
    low + (span * completed.min(total) / total) as u8
}
