//! 单份提交处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责处理一份提交中的所有作答，是提交级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **并发评分**：每道题一个 `ResponseFlow::run`，用 Semaphore 限制同时在途的数量
//! 2. **进度回报**：每完成一道题调用一次进度回调
//! 3. **结果汇总**：全部成功时返回总分；任意一道失败时整份提交失败，
//!    错误中列出每道失败的题目

use futures::future::{join_all, BoxFuture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::error::{GradingError, SubmissionError};
use crate::models::{QuestionOutcome, SubmissionGradingResult, SubmissionRequest};
use crate::workflow::{ResponseCtx, ResponseFlow};

/// 一道题完成后的进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionProgress {
    pub question_id: i64,
    pub completed: usize,
    pub total: usize,
}

/// 进度回调
pub type ProgressCallback = Arc<dyn Fn(SubmissionProgress) -> BoxFuture<'static, ()> + Send + Sync>;

/// 单份提交处理器
pub struct SubmissionProcessor {
    flow: Arc<ResponseFlow>,
    max_concurrent: usize,
}

impl SubmissionProcessor {
    pub fn new(flow: Arc<ResponseFlow>, max_concurrent: usize) -> Self {
        Self {
            flow,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 评分整份提交
    ///
    /// 题目之间没有顺序保证；同一道题内部严格按流程顺序执行
    pub async fn process(
        &self,
        submission: &SubmissionRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<SubmissionGradingResult, SubmissionError> {
        if submission.responses.is_empty() {
            return Err(SubmissionError::EmptySubmission);
        }

        let ctx = ResponseCtx::from_submission(submission);
        let total = submission.responses.len();
        info!("{} 开始评分 {} 道题", ctx, total);

        let semaphore = Semaphore::new(self.max_concurrent);
        let completed = AtomicUsize::new(0);

        let tasks = submission.responses.iter().map(|input| {
            let ctx = &ctx;
            let semaphore = &semaphore;
            let completed = &completed;
            let progress = progress.clone();
            async move {
                let outcome = {
                    let _permit = semaphore.acquire().await.ok();
                    self.flow.run(input, ctx).await
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = progress {
                    callback(SubmissionProgress {
                        question_id: input.question_id,
                        completed: done,
                        total,
                    })
                    .await;
                }
                (input.question_id, outcome)
            }
        });

        let results = join_all(tasks).await;

        let mut outcomes: Vec<QuestionOutcome> = Vec::with_capacity(total);
        let mut failures: Vec<(i64, GradingError)> = Vec::new();
        for (question_id, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("{} ❌ 题目 {} 评分失败: {}", ctx, question_id, e);
                    failures.push((question_id, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(SubmissionError::PartialFailure {
                failures,
                succeeded: outcomes.len(),
            });
        }

        let summary =
            SubmissionGradingResult::from_outcomes(submission.assignment_id, submission.attempt_id, outcomes);
        info!(
            "{} ✅ 评分完成: {}/{}",
            ctx, summary.total_points, summary.total_possible
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryStore, StaticLocalizer};
    use crate::config::ConsistencyConfig;
    use crate::models::{Choice, Question, QuestionResponseInput, QuestionType, UserRole};
    use crate::services::{AuditRecorder, ConsistencyService};
    use crate::strategies::test_support::{deps, FixedJudgment};
    use crate::strategies::StrategyRegistry;
    use std::sync::Mutex;

    fn processor(store: Arc<InMemoryStore>, judge: Arc<FixedJudgment>) -> SubmissionProcessor {
        let flow = ResponseFlow::new(
            Arc::new(StrategyRegistry::with_defaults(&deps(judge))),
            store.clone(),
            Arc::new(ConsistencyService::new(ConsistencyConfig::default(), store.clone())),
            Arc::new(AuditRecorder::new(store)),
            Arc::new(StaticLocalizer::new()),
            false,
        );
        SubmissionProcessor::new(Arc::new(flow), 2)
    }

    fn single_choice(id: i64) -> Question {
        Question {
            id,
            question: format!("Pick the right option ({})", id),
            question_type: QuestionType::SingleCorrect,
            response_type: None,
            total_points: 10.0,
            choices: vec![
                Choice {
                    choice: "Option A".into(),
                    points: 10.0,
                    is_correct: true,
                    feedback: None,
                },
                Choice {
                    choice: "Option B".into(),
                    points: 0.0,
                    is_correct: false,
                    feedback: None,
                },
            ],
            scoring: None,
            grading_context_question_ids: vec![],
        }
    }

    fn pick(id: i64, choice: &str) -> QuestionResponseInput {
        let mut input = QuestionResponseInput::new(id);
        input.learner_choices = Some(vec![choice.to_string()]);
        input
    }

    fn submission(responses: Vec<QuestionResponseInput>) -> SubmissionRequest {
        SubmissionRequest {
            assignment_id: 3,
            attempt_id: Some(11),
            user_id: "learner".into(),
            role: UserRole::Learner,
            language: "en".into(),
            instructions: String::new(),
            responses,
        }
    }

    #[tokio::test]
    async fn test_all_responses_graded_and_totalled() {
        let store = Arc::new(InMemoryStore::new());
        for id in 1..=3 {
            store.insert_attempt_question(11, single_choice(id)).await;
        }
        let processor = processor(store.clone(), Arc::new(FixedJudgment::new(0.0, "")));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |p: SubmissionProgress| {
            sink.lock().unwrap().push(p.completed);
            Box::pin(async {})
        });

        let result = processor
            .process(
                &submission(vec![pick(3, "Option A"), pick(1, "Option B"), pick(2, "Option A")]),
                Some(callback),
            )
            .await
            .unwrap();

        assert_eq!(result.total_points, 20.0);
        assert_eq!(result.total_possible, 30.0);
        let ids: Vec<i64> = result.outcomes.iter().map(|o| o.question_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let mut completed = seen.lock().unwrap().clone();
        completed.sort();
        assert_eq!(completed, vec![1, 2, 3]);
        assert_eq!(store.saved_response_count().await, 3);
    }

    #[tokio::test]
    async fn test_one_failure_fails_the_whole_submission() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_attempt_question(11, single_choice(1)).await;
        let processor = processor(store, Arc::new(FixedJudgment::new(0.0, "")));

        let err = processor
            .process(&submission(vec![pick(1, "Option A"), pick(2, "Option A")]), None)
            .await
            .unwrap_err();

        match err {
            SubmissionError::PartialFailure { failures, succeeded } => {
                assert_eq!(succeeded, 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, 2);
                assert!(matches!(failures[0].1, GradingError::QuestionNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_submission_is_rejected() {
        let processor = processor(Arc::new(InMemoryStore::new()), Arc::new(FixedJudgment::new(0.0, "")));
        let err = processor.process(&submission(vec![]), None).await.unwrap_err();
        assert!(matches!(err, SubmissionError::EmptySubmission));
    }
}
