//! 评分任务与状态事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Display;

/// 任务状态机：Pending → Processing → {Completed, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// 终态不再变更
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 是否允许从当前状态写入 `next`
    ///
    /// Processing → Processing 用于进度更新
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Processing, _) => next != JobStatus::Pending,
            (JobStatus::Pending, JobStatus::Pending) => true,
            _ => false,
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "Pending",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// 持久化的评分任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingJob {
    pub id: String,
    /// 作者预览时为空
    pub attempt_id: Option<i64>,
    pub assignment_id: i64,
    pub user_id: String,
    pub status: JobStatus,
    pub progress: String,
    pub percentage: u8,
    pub result: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建任务所需字段
#[derive(Debug, Clone, PartialEq)]
pub struct NewGradingJob {
    pub attempt_id: Option<i64>,
    pub assignment_id: i64,
    pub user_id: String,
}

/// 任务的部分更新
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<String>,
    pub percentage: Option<u8>,
    pub result: Option<JsonValue>,
}

impl JobUpdate {
    pub fn progress(status: JobStatus, progress: impl Into<String>, percentage: u8) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress.into()),
            percentage: Some(percentage.min(100)),
            result: None,
        }
    }

    pub fn with_result(mut self, result: JsonValue) -> Self {
        self.result = Some(result);
        self
    }
}

/// 状态事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobEventType {
    Update,
    Heartbeat,
    Error,
    Finalize,
}

/// 状态事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEventData {
    pub timestamp: DateTime<Utc>,
    pub status: Option<JobStatus>,
    pub progress: String,
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub done: bool,
}

/// 推送给订阅方的状态事件（不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    #[serde(rename = "type")]
    pub event_type: JobEventType,
    pub data: JobEventData,
}

impl JobStatusEvent {
    /// 由任务行生成事件；终态生成 finalize，其余生成 update
    pub fn from_job(job: &GradingJob) -> Self {
        let done = job.status.is_terminal();
        Self {
            event_type: if done {
                JobEventType::Finalize
            } else {
                JobEventType::Update
            },
            data: JobEventData {
                timestamp: Utc::now(),
                status: Some(job.status),
                progress: job.progress.clone(),
                percentage: job.percentage,
                result: job.result.clone(),
                done,
            },
        }
    }

    pub fn heartbeat(status: Option<JobStatus>, progress: impl Into<String>, percentage: u8) -> Self {
        Self {
            event_type: JobEventType::Heartbeat,
            data: JobEventData {
                timestamp: Utc::now(),
                status,
                progress: progress.into(),
                percentage,
                result: None,
                done: false,
            },
        }
    }

    /// 状态流放弃时的错误事件；任务本身仍在运行，`done` 保持为假
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event_type: JobEventType::Error,
            data: JobEventData {
                timestamp: Utc::now(),
                status: None,
                progress: message.into(),
                percentage: 0,
                result: None,
                done: false,
            },
        }
    }

    pub fn is_done(&self) -> bool {
        self.data.done
    }
}
