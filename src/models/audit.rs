//! 评分审计记录与统计结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// 审计记录（只追加，不修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingAuditEntry {
    pub question_id: i64,
    pub assignment_id: i64,
    /// 包含 `learnerResponse` 等原始作答信息
    pub request_payload: JsonValue,
    /// 序列化后的 `GradingResult`（含 `maxPoints`）
    pub response_payload: JsonValue,
    pub strategy_name: String,
    pub metadata: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl GradingAuditEntry {
    /// 请求中记录的原始作答文本
    pub fn learner_response(&self) -> Option<&str> {
        self.request_payload
            .get("learnerResponse")
            .and_then(|v| v.as_str())
    }

    /// 本次评分得分
    pub fn total_points(&self) -> Option<f64> {
        self.response_payload
            .get("totalPoints")
            .and_then(|v| v.as_f64())
    }

    /// 本次评分满分
    pub fn max_points(&self) -> Option<f64> {
        self.response_payload
            .get("maxPoints")
            .and_then(|v| v.as_f64())
    }

    /// 所有反馈拼接后的文本
    pub fn feedback_text(&self) -> String {
        self.response_payload
            .get("feedback")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("feedback").and_then(|f| f.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

/// 审计查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub question_id: Option<i64>,
    pub assignment_id: Option<i64>,
    pub strategy_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &GradingAuditEntry) -> bool {
        self.question_id.map_or(true, |q| entry.question_id == q)
            && self.assignment_id.map_or(true, |a| entry.assignment_id == a)
            && self
                .strategy_name
                .as_ref()
                .map_or(true, |s| &entry.strategy_name == s)
            && self.since.map_or(true, |t| entry.timestamp >= t)
    }
}

/// 分组计数字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditGroupField {
    StrategyName,
    QuestionId,
}

/// 单题分数统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingStatistics {
    pub question_id: i64,
    pub count: usize,
    pub average_points: f64,
    pub min_points: f64,
    pub max_points: f64,
    pub zero_count: usize,
    pub max_score_count: usize,
    /// 按得分率分桶：0-20%、20-40%、40-60%、60-80%、80-100%
    pub distribution: [usize; 5],
}

/// 使用量统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingUsageStatistics {
    pub since: DateTime<Utc>,
    pub total_gradings: u64,
    pub by_strategy: BTreeMap<String, u64>,
    pub by_question: BTreeMap<String, u64>,
}

/// 评分异常类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradingIssueKind {
    ExcessiveZeros,
    ExcessiveMaxScores,
}

/// 评分异常
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingIssue {
    pub question_id: i64,
    pub kind: GradingIssueKind,
    /// 触发比例（0-1）
    pub ratio: f64,
    pub sample_size: usize,
    pub description: String,
}
