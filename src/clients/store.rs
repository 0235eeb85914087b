//! 数据存储客户端
//!
//! 评分引擎只通过 `DataStore` 的这些形状访问持久化层；
//! `InMemoryStore` 是完整的进程内实现，供运行器与测试使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AuditFilter, AuditGroupField, GradingAuditEntry, GradingJob, JobStatus, JobUpdate,
    NewGradingJob, Question, QuestionResponseRecord,
};

/// 持久化层
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn create_job(&self, job: NewGradingJob) -> StoreResult<GradingJob>;

    async fn update_job(&self, id: &str, update: JobUpdate) -> StoreResult<GradingJob>;

    async fn find_job(&self, id: &str) -> StoreResult<Option<GradingJob>>;

    async fn create_audit_record(&self, entry: GradingAuditEntry) -> StoreResult<()>;

    /// 按时间倒序返回某题 `since` 之后的最近 `limit` 条审计记录
    async fn find_recent_audit_records(
        &self,
        question_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<GradingAuditEntry>>;

    async fn count_records(&self, filter: &AuditFilter) -> StoreResult<u64>;

    async fn group_by_count(
        &self,
        field: AuditGroupField,
        filter: &AuditFilter,
    ) -> StoreResult<BTreeMap<String, u64>>;

    /// 学习者路径：读取该次作答下的题目（已应用变体与翻译）
    async fn find_attempt_question(
        &self,
        attempt_id: i64,
        question_id: i64,
    ) -> StoreResult<Option<Question>>;

    async fn save_question_response(&self, record: QuestionResponseRecord) -> StoreResult<()>;
}

/// 进程内存储
#[derive(Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<String, GradingJob>>,
    audit: RwLock<Vec<GradingAuditEntry>>,
    attempt_questions: RwLock<HashMap<(i64, i64), Question>>,
    responses: RwLock<HashMap<(i64, i64), QuestionResponseRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某次作答登记题目
    pub async fn insert_attempt_question(&self, attempt_id: i64, question: Question) {
        self.attempt_questions
            .write()
            .await
            .insert((attempt_id, question.id), question);
    }

    /// 读取已保存的作答
    pub async fn question_response(
        &self,
        attempt_id: i64,
        question_id: i64,
    ) -> Option<QuestionResponseRecord> {
        self.responses
            .read()
            .await
            .get(&(attempt_id, question_id))
            .cloned()
    }

    pub async fn saved_response_count(&self) -> usize {
        self.responses.read().await.len()
    }

    pub async fn audit_entries(&self) -> Vec<GradingAuditEntry> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn create_job(&self, job: NewGradingJob) -> StoreResult<GradingJob> {
        let now = Utc::now();
        let job = GradingJob {
            id: uuid::Uuid::new_v4().to_string(),
            attempt_id: job.attempt_id,
            assignment_id: job.assignment_id,
            user_id: job.user_id,
            status: JobStatus::Pending,
            progress: "Job created".to_string(),
            percentage: 0,
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        debug!("创建任务 {}", job.id);
        Ok(job)
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> StoreResult<GradingJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "grading_job",
            id: id.to_string(),
        })?;

        if job.status.is_terminal() {
            return Err(StoreError::TerminalJob {
                job_id: id.to_string(),
                status: job.status.to_string(),
            });
        }

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(progress) = update.progress {
            job.progress = progress;
        }
        if let Some(percentage) = update.percentage {
            job.percentage = percentage;
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        job.updated_at = Utc::now();

        Ok(job.clone())
    }

    async fn find_job(&self, id: &str) -> StoreResult<Option<GradingJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn create_audit_record(&self, entry: GradingAuditEntry) -> StoreResult<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }

    async fn find_recent_audit_records(
        &self,
        question_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<GradingAuditEntry>> {
        let audit = self.audit.read().await;
        let mut rows: Vec<GradingAuditEntry> = audit
            .iter()
            .filter(|e| e.question_id == question_id && e.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count_records(&self, filter: &AuditFilter) -> StoreResult<u64> {
        let audit = self.audit.read().await;
        Ok(audit.iter().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn group_by_count(
        &self,
        field: AuditGroupField,
        filter: &AuditFilter,
    ) -> StoreResult<BTreeMap<String, u64>> {
        let audit = self.audit.read().await;
        let mut counts = BTreeMap::new();
        for entry in audit.iter().filter(|e| filter.matches(e)) {
            let key = match field {
                AuditGroupField::StrategyName => entry.strategy_name.clone(),
                AuditGroupField::QuestionId => entry.question_id.to_string(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_attempt_question(
        &self,
        attempt_id: i64,
        question_id: i64,
    ) -> StoreResult<Option<Question>> {
        Ok(self
            .attempt_questions
            .read()
            .await
            .get(&(attempt_id, question_id))
            .cloned())
    }

    async fn save_question_response(&self, record: QuestionResponseRecord) -> StoreResult<()> {
        self.responses
            .write()
            .await
            .insert((record.attempt_id, record.question_id), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn audit_entry(question_id: i64, strategy: &str, minutes_ago: i64) -> GradingAuditEntry {
        GradingAuditEntry {
            question_id,
            assignment_id: 1,
            request_payload: json!({"learnerResponse": "x"}),
            response_payload: json!({"totalPoints": 1.0, "maxPoints": 2.0}),
            strategy_name: strategy.to_string(),
            metadata: json!({}),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_terminal_job_is_immutable() {
        let store = InMemoryStore::new();
        let job = store
            .create_job(NewGradingJob {
                attempt_id: None,
                assignment_id: 5,
                user_id: "author".into(),
            })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        store
            .update_job(&job.id, JobUpdate::progress(JobStatus::Completed, "done", 100))
            .await
            .unwrap();

        let err = store
            .update_job(&job.id, JobUpdate::progress(JobStatus::Processing, "again", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TerminalJob { .. }));

        let job = store.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.percentage, 100);
    }

    #[tokio::test]
    async fn test_recent_audit_records_are_newest_first_and_limited() {
        let store = InMemoryStore::new();
        for minutes in [30, 10, 20, 60 * 24 * 9] {
            store
                .create_audit_record(audit_entry(1, "TextStrategy", minutes))
                .await
                .unwrap();
        }
        store
            .create_audit_record(audit_entry(2, "TextStrategy", 1))
            .await
            .unwrap();

        let since = Utc::now() - Duration::days(7);
        let rows = store.find_recent_audit_records(1, since, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].timestamp > rows[1].timestamp);
    }

    #[tokio::test]
    async fn test_group_by_count() {
        let store = InMemoryStore::new();
        store.create_audit_record(audit_entry(1, "TextStrategy", 1)).await.unwrap();
        store.create_audit_record(audit_entry(2, "TextStrategy", 1)).await.unwrap();
        store.create_audit_record(audit_entry(2, "UrlStrategy", 1)).await.unwrap();

        let filter = AuditFilter::default();
        let by_strategy = store
            .group_by_count(AuditGroupField::StrategyName, &filter)
            .await
            .unwrap();
        assert_eq!(by_strategy.get("TextStrategy"), Some(&2));
        assert_eq!(by_strategy.get("UrlStrategy"), Some(&1));

        let filter = AuditFilter {
            question_id: Some(2),
            ..Default::default()
        };
        assert_eq!(store.count_records(&filter).await.unwrap(), 2);
    }
}
