//! 场景测试共用的测试替身
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use grading_orchestrator::clients::{
    ContentExtractor, DataStore, ExtractedContent, FetchedContent, FileEvaluation, ImageEvaluation,
    InMemoryStore, JudgmentResponse, JudgmentService, PresentationEvaluation, StaticLocalizer,
    TextEvaluation, UrlEvaluation, UrlFetcher,
};
use grading_orchestrator::config::{ConsistencyConfig, StreamConfig};
use grading_orchestrator::error::{StoreError, StoreResult};
use grading_orchestrator::models::{
    AuditFilter, AuditGroupField, FileRef, GradingAuditEntry, GradingJob, JobUpdate, NewGradingJob,
    Question, QuestionResponseRecord,
};
use grading_orchestrator::services::{AuditRecorder, ConsistencyService};
use grading_orchestrator::strategies::{StrategyDeps, StrategyRegistry};
use grading_orchestrator::{GradingJobManager, JobStatusStream, ResponseFlow, SubmissionProcessor};

/// 按顺序返回预设分数的评判服务，用完后重复最后一个
pub struct ScriptedJudgment {
    points: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    pub calls: AtomicUsize,
}

impl ScriptedJudgment {
    pub fn new(points: &[f64]) -> Self {
        Self {
            points: Mutex::new(points.iter().copied().collect()),
            last: Mutex::new(points.last().copied().unwrap_or(0.0)),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self, feedback: &str) -> anyhow::Result<JudgmentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let points = match self.points.lock().unwrap().pop_front() {
            Some(p) => {
                *self.last.lock().unwrap() = p;
                p
            }
            None => *self.last.lock().unwrap(),
        };
        Ok(JudgmentResponse {
            points,
            feedback: format!("{} ({} points)", feedback, points),
            rationale: None,
            rubric_scores: None,
        })
    }
}

#[async_trait]
impl JudgmentService for ScriptedJudgment {
    async fn grade_text_based(&self, _: &TextEvaluation, _: i64, _: &str) -> anyhow::Result<JudgmentResponse> {
        self.next("text")
    }
    async fn grade_file_based(&self, _: &FileEvaluation, _: i64, _: &str) -> anyhow::Result<JudgmentResponse> {
        self.next("file")
    }
    async fn grade_url_based(&self, _: &UrlEvaluation, _: i64, _: &str) -> anyhow::Result<JudgmentResponse> {
        self.next("url")
    }
    async fn grade_image_based(&self, _: &ImageEvaluation, _: i64, _: &str) -> anyhow::Result<JudgmentResponse> {
        self.next("image")
    }
    async fn grade_presentation_based(
        &self,
        _: &PresentationEvaluation,
        _: i64,
        _: &str,
    ) -> anyhow::Result<JudgmentResponse> {
        self.next("presentation")
    }
}

pub struct NoExtraction;

#[async_trait]
impl ContentExtractor for NoExtraction {
    async fn extract_content_from_files(&self, _: &[FileRef]) -> anyhow::Result<Vec<ExtractedContent>> {
        Ok(vec![])
    }
}

pub struct Offline;

#[async_trait]
impl UrlFetcher for Offline {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedContent> {
        anyhow::bail!("offline: {}", url)
    }
}

/// 包装内存存储：统计审计读取次数，记录任务读取时刻，可让任务读取失败
#[derive(Default)]
pub struct ObservedStore {
    pub inner: InMemoryStore,
    pub audit_reads: AtomicUsize,
    pub fail_job_reads: AtomicBool,
    /// 接下来这么多次任务读取失败
    pub fail_next_job_reads: AtomicUsize,
    pub job_reads: Mutex<Vec<Instant>>,
}

impl ObservedStore {
    /// 相邻两次任务读取之间的间隔（毫秒）
    pub fn job_read_gaps_ms(&self) -> Vec<u128> {
        let reads = self.job_reads.lock().unwrap();
        reads
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_millis())
            .collect()
    }
}

#[async_trait]
impl DataStore for ObservedStore {
    async fn create_job(&self, job: NewGradingJob) -> StoreResult<GradingJob> {
        self.inner.create_job(job).await
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> StoreResult<GradingJob> {
        self.inner.update_job(id, update).await
    }

    async fn find_job(&self, id: &str) -> StoreResult<Option<GradingJob>> {
        self.job_reads.lock().unwrap().push(Instant::now());
        let scheduled_failure = self
            .fail_next_job_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.fail_job_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database is down".into()));
        }
        self.inner.find_job(id).await
    }

    async fn create_audit_record(&self, entry: GradingAuditEntry) -> StoreResult<()> {
        self.inner.create_audit_record(entry).await
    }

    async fn find_recent_audit_records(
        &self,
        question_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<GradingAuditEntry>> {
        self.audit_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_recent_audit_records(question_id, since, limit).await
    }

    async fn count_records(&self, filter: &AuditFilter) -> StoreResult<u64> {
        self.inner.count_records(filter).await
    }

    async fn group_by_count(
        &self,
        field: AuditGroupField,
        filter: &AuditFilter,
    ) -> StoreResult<BTreeMap<String, u64>> {
        self.inner.group_by_count(field, filter).await
    }

    async fn find_attempt_question(&self, attempt_id: i64, question_id: i64) -> StoreResult<Option<Question>> {
        self.inner.find_attempt_question(attempt_id, question_id).await
    }

    async fn save_question_response(&self, record: QuestionResponseRecord) -> StoreResult<()> {
        self.inner.save_question_response(record).await
    }
}

/// 组装好的评分引擎
pub struct Engine {
    pub store: Arc<ObservedStore>,
    pub judge: Arc<ScriptedJudgment>,
    pub consistency: Arc<ConsistencyService>,
    pub processor: Arc<SubmissionProcessor>,
    pub manager: Arc<GradingJobManager>,
}

pub fn engine(points: &[f64]) -> Engine {
    let store = Arc::new(ObservedStore::default());
    let data_store: Arc<dyn DataStore> = store.clone();
    let judge = Arc::new(ScriptedJudgment::new(points));

    let deps = StrategyDeps {
        judgment: judge.clone(),
        extractor: Arc::new(NoExtraction),
        fetcher: Arc::new(Offline),
        localizer: Arc::new(StaticLocalizer::new()),
    };
    let consistency = Arc::new(ConsistencyService::new(
        ConsistencyConfig::default(),
        data_store.clone(),
    ));
    let flow = Arc::new(ResponseFlow::new(
        Arc::new(StrategyRegistry::with_defaults(&deps)),
        data_store.clone(),
        consistency.clone(),
        Arc::new(AuditRecorder::new(data_store.clone())),
        deps.localizer.clone(),
        false,
    ));
    let processor = Arc::new(SubmissionProcessor::new(flow, 4));
    let stream = Arc::new(JobStatusStream::new(data_store.clone(), StreamConfig::default()));
    let manager = Arc::new(GradingJobManager::new(data_store, processor.clone(), stream, 2));

    Engine {
        store,
        judge,
        consistency,
        processor,
        manager,
    }
}
