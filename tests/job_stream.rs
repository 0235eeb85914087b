mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::engine;
use grading_orchestrator::clients::DataStore;
use grading_orchestrator::orchestrator::JobSubscription;
use grading_orchestrator::models::{
    JobEventType, JobStatus, JobStatusEvent, QuestionResponseInput, SubmissionRequest, UserRole,
};
use serde_json::json;

fn submission(responses: Vec<QuestionResponseInput>) -> SubmissionRequest {
    SubmissionRequest {
        assignment_id: 5,
        attempt_id: Some(77),
        user_id: "learner-1".into(),
        role: UserRole::Learner,
        language: "en".into(),
        instructions: String::new(),
        responses,
    }
}

async fn drain(sub: &mut JobSubscription) -> Vec<JobStatusEvent> {
    let mut events = Vec::new();
    while let Some(event) = sub.next().await {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_job_progress_is_monotonic_with_single_finalize() {
    let engine = engine(&[]);
    let job = engine.manager.create_job(&submission(vec![])).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let mut sub = engine.manager.stream().subscribe(&job.id);
    let connected = sub.next().await.unwrap();
    assert_eq!(connected.event_type, JobEventType::Heartbeat);
    assert_eq!(connected.data.progress, "connected");

    for (step, percentage) in [0u8, 20, 70, 90].into_iter().enumerate() {
        engine
            .manager
            .update_progress(&job.id, &format!("step {}", step), percentage)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;
    }
    engine
        .manager
        .complete_job(&job.id, json!({ "totalPoints": 10 }))
        .await
        .unwrap();

    let events = drain(&mut sub).await;

    let updates: Vec<u8> = events
        .iter()
        .filter(|e| e.event_type == JobEventType::Update)
        .map(|e| e.data.percentage)
        .collect();
    assert!(updates.windows(2).all(|w| w[0] <= w[1]), "{:?}", updates);
    for expected in [20, 70, 90] {
        assert!(updates.contains(&expected), "{:?}", updates);
    }

    let finals: Vec<&JobStatusEvent> = events
        .iter()
        .filter(|e| e.event_type == JobEventType::Finalize)
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].data.status, Some(JobStatus::Completed));
    assert_eq!(finals[0].data.percentage, 100);
    assert!(finals[0].data.done);
    assert_eq!(events.last().unwrap().event_type, JobEventType::Finalize);
}

#[tokio::test(start_paused = true)]
async fn test_stream_gives_up_after_consecutive_poll_errors() {
    let engine = engine(&[]);
    let job = engine.manager.create_job(&submission(vec![])).await.unwrap();
    engine.store.fail_job_reads.store(true, Ordering::SeqCst);

    let mut sub = engine.manager.stream().subscribe(&job.id);
    let events = drain(&mut sub).await;

    assert_eq!(events.first().unwrap().data.progress, "connected");
    let last = events.last().unwrap();
    assert_eq!(last.event_type, JobEventType::Error);
    assert!(!last.data.done);
    assert!(last.data.progress.contains("10"));

    // 失败后间隔翻倍，封顶 15s；第 10 次失败在 117s
    assert_eq!(
        engine.store.job_read_gaps_ms(),
        vec![4_000, 8_000, 15_000, 15_000, 15_000, 15_000, 15_000, 15_000, 15_000]
    );

    // 任务行保持原样
    let row = engine.store.inner.find_job(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_successful_polls_shrink_delay_back_to_floor() {
    let engine = engine(&[]);
    let job = engine.manager.create_job(&submission(vec![])).await.unwrap();
    engine.store.fail_next_job_reads.store(3, Ordering::SeqCst);

    let sub = engine.manager.stream().subscribe(&job.id);
    tokio::time::sleep(Duration::from_secs(90)).await;
    drop(sub);

    let gaps = engine.store.job_read_gaps_ms();
    assert_eq!(gaps[..4], [4_000, 8_000, 15_000, 11_250]);

    // 成功后每次 ×3/4，直到 2s 下限
    let shrinking = &gaps[3..];
    assert!(
        shrinking.windows(2).all(|w| w[1] <= w[0] + 1),
        "{:?}",
        shrinking
    );
    assert!(shrinking.iter().all(|gap| *gap >= 2_000), "{:?}", shrinking);
    assert_eq!(shrinking[shrinking.len() - 3..], [2_000, 2_000, 2_000]);
}

#[tokio::test(start_paused = true)]
async fn test_late_subscriber_receives_finalize_from_poll() {
    let engine = engine(&[]);
    let mut input = QuestionResponseInput::new(1);
    input.learner_text_response = Some("hello".into());
    let submission = submission(vec![input]);
    let job = engine.manager.create_job(&submission).await.unwrap();

    // 题目不存在，任务以失败结束
    engine.manager.start_job(&job.id, submission).await.unwrap();

    let mut sub = engine.manager.stream().subscribe(&job.id);
    let events = drain(&mut sub).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, JobEventType::Finalize);
    assert_eq!(events[1].data.status, Some(JobStatus::Failed));
    assert!(events[1].data.result.as_ref().unwrap()["error"]
        .as_str()
        .unwrap()
        .contains("题目 1"));
}

#[tokio::test(start_paused = true)]
async fn test_job_runs_to_completion_through_stream() {
    let engine = engine(&[6.0]);
    let mut question = grading_orchestrator::Question {
        id: 1,
        question: "Describe borrowing".into(),
        question_type: grading_orchestrator::models::QuestionType::Text,
        response_type: None,
        total_points: 8.0,
        choices: vec![],
        scoring: None,
        grading_context_question_ids: vec![],
    };
    engine.store.inner.insert_attempt_question(77, question.clone()).await;
    question.id = 2;
    engine.store.inner.insert_attempt_question(77, question).await;

    let responses = (1..=2)
        .map(|id| {
            let mut input = QuestionResponseInput::new(id);
            input.learner_text_response = Some(format!("answer {}", id));
            input
        })
        .collect();
    let submission = submission(responses);
    let job = engine.manager.create_job(&submission).await.unwrap();

    let mut sub = engine.manager.stream().subscribe(&job.id);
    let _running = engine.manager.start_job(&job.id, submission);
    let events = drain(&mut sub).await;

    let finalize = events.last().unwrap();
    assert_eq!(finalize.event_type, JobEventType::Finalize);
    assert_eq!(finalize.data.status, Some(JobStatus::Completed));
    let result = finalize.data.result.as_ref().unwrap();
    assert_eq!(result["totalPoints"], 12.0);
    assert_eq!(result["totalPossible"], 16.0);
    assert_eq!(engine.store.inner.saved_response_count().await, 2);
}
