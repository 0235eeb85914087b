//! 评分审计服务 - 业务能力层
//!
//! 每次评分决策写一条审计记录。写入失败只记日志，绝不向上抛出；
//! 统计接口都是对已写入记录的只读聚合。

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::DataStore;
use crate::error::StoreResult;
use crate::models::{
    AuditFilter, AuditGroupField, GradingAuditEntry, GradingIssue, GradingIssueKind,
    GradingResult, GradingStatistics, GradingUsageStatistics,
};

/// 统计与异常识别使用的样本条数
const STATISTICS_SAMPLE: usize = 100;

/// 零分比例超过该值视为异常
const EXCESSIVE_ZERO_RATIO: f64 = 0.4;

/// 满分比例超过该值视为异常
const EXCESSIVE_MAX_RATIO: f64 = 0.6;

/// 审计服务
pub struct AuditRecorder {
    store: Arc<dyn DataStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// 组装一条审计记录
    ///
    /// 请求负载带 `learnerResponse`，响应负载是评分结果加 `maxPoints`
    pub fn build_entry(
        question_id: i64,
        assignment_id: i64,
        learner_response: &str,
        result: &GradingResult,
        max_points: f64,
        strategy_name: &str,
        metadata: JsonValue,
    ) -> GradingAuditEntry {
        let mut response_payload = serde_json::to_value(result).unwrap_or_default();
        if let Some(map) = response_payload.as_object_mut() {
            map.insert("maxPoints".to_string(), json!(max_points));
        }

        GradingAuditEntry {
            question_id,
            assignment_id,
            request_payload: json!({
                "questionId": question_id,
                "learnerResponse": learner_response,
            }),
            response_payload,
            strategy_name: strategy_name.to_string(),
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// 写入审计记录，失败只记 warn
    pub async fn record_grading(&self, entry: GradingAuditEntry) {
        let question_id = entry.question_id;
        let strategy = entry.strategy_name.clone();
        match self.store.create_audit_record(entry).await {
            Ok(()) => debug!("审计记录已写入: 题目 {} ({})", question_id, strategy),
            Err(e) => warn!("⚠️ 题目 {} 审计记录写入失败: {}", question_id, e),
        }
    }

    /// 某题最近 100 条评分的分数统计
    pub async fn get_grading_statistics(&self, question_id: i64) -> StoreResult<GradingStatistics> {
        let rows = self.recent_rows(question_id).await?;
        Ok(compute_statistics(question_id, &rows))
    }

    /// `since` 之后的评分总量、按策略与按题目计数
    pub async fn get_grading_usage_statistics(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<GradingUsageStatistics> {
        let filter = AuditFilter {
            since: Some(since),
            ..Default::default()
        };
        let total_gradings = self.store.count_records(&filter).await?;
        let by_strategy = self
            .store
            .group_by_count(AuditGroupField::StrategyName, &filter)
            .await?;
        let by_question = self
            .store
            .group_by_count(AuditGroupField::QuestionId, &filter)
            .await?;

        Ok(GradingUsageStatistics {
            since,
            total_gradings,
            by_strategy,
            by_question,
        })
    }

    /// 识别评分异常：零分过多（>40%）或满分过多（>60%）
    pub async fn identify_grading_issues(&self, question_id: i64) -> StoreResult<Vec<GradingIssue>> {
        let rows = self.recent_rows(question_id).await?;
        let stats = compute_statistics(question_id, &rows);
        Ok(detect_issues(&stats))
    }

    async fn recent_rows(&self, question_id: i64) -> StoreResult<Vec<GradingAuditEntry>> {
        // 统计不限时间窗口，只取最近的样本
        let since = Utc::now() - ChronoDuration::days(365 * 100);
        self.store
            .find_recent_audit_records(question_id, since, STATISTICS_SAMPLE)
            .await
    }
}

fn compute_statistics(question_id: i64, rows: &[GradingAuditEntry]) -> GradingStatistics {
    let scored: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|row| Some((row.total_points()?, row.max_points().unwrap_or(0.0))))
        .collect();

    let mut stats = GradingStatistics {
        question_id,
        count: scored.len(),
        average_points: 0.0,
        min_points: 0.0,
        max_points: 0.0,
        zero_count: 0,
        max_score_count: 0,
        distribution: [0; 5],
    };
    if scored.is_empty() {
        return stats;
    }

    stats.min_points = f64::INFINITY;
    stats.max_points = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &(points, max) in &scored {
        sum += points;
        stats.min_points = stats.min_points.min(points);
        stats.max_points = stats.max_points.max(points);
        if points <= 0.0 {
            stats.zero_count += 1;
        }
        if max > 0.0 && points >= max {
            stats.max_score_count += 1;
        }
        let ratio = if max > 0.0 { points / max } else { 0.0 };
        let bucket = ((ratio * 5.0).floor() as usize).min(4);
        stats.distribution[bucket] += 1;
    }
    stats.average_points = sum / scored.len() as f64;
    stats
}

fn detect_issues(stats: &GradingStatistics) -> Vec<GradingIssue> {
    let mut issues = Vec::new();
    if stats.count == 0 {
        return issues;
    }

    let zero_ratio = stats.zero_count as f64 / stats.count as f64;
    if zero_ratio > EXCESSIVE_ZERO_RATIO {
        issues.push(GradingIssue {
            question_id: stats.question_id,
            kind: GradingIssueKind::ExcessiveZeros,
            ratio: zero_ratio,
            sample_size: stats.count,
            description: format!(
                "{:.0}% of the last {} gradings awarded zero points",
                zero_ratio * 100.0,
                stats.count
            ),
        });
    }

    let max_ratio = stats.max_score_count as f64 / stats.count as f64;
    if max_ratio > EXCESSIVE_MAX_RATIO {
        issues.push(GradingIssue {
            question_id: stats.question_id,
            kind: GradingIssueKind::ExcessiveMaxScores,
            ratio: max_ratio,
            sample_size: stats.count,
            description: format!(
                "{:.0}% of the last {} gradings awarded full marks",
                max_ratio * 100.0,
                stats.count
            ),
        });
    }

    issues
}
