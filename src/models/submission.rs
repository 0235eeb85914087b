//! 一次提交（整份作答）的输入与输出

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::grading::{Feedback, GradingResult, UserRole};
use crate::models::response::QuestionResponseInput;

/// 提交请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub assignment_id: i64,
    /// 作者预览时为空
    #[serde(default)]
    pub attempt_id: Option<i64>,
    pub user_id: String,
    pub role: UserRole,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub instructions: String,
    pub responses: Vec<QuestionResponseInput>,
}

fn default_language() -> String {
    "en".to_string()
}

impl SubmissionRequest {
    pub fn is_author_preview(&self) -> bool {
        self.role == UserRole::Author || self.attempt_id.is_none()
    }
}

/// 单题评分结果（带题号与题干）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub question_text: String,
    pub max_points: f64,
    pub result: GradingResult,
}

/// 整份提交的评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionGradingResult {
    pub assignment_id: i64,
    pub attempt_id: Option<i64>,
    pub total_points: f64,
    pub total_possible: f64,
    pub outcomes: Vec<QuestionOutcome>,
}

impl SubmissionGradingResult {
    pub fn from_outcomes(
        assignment_id: i64,
        attempt_id: Option<i64>,
        mut outcomes: Vec<QuestionOutcome>,
    ) -> Self {
        outcomes.sort_by_key(|o| o.question_id);
        let total_points = outcomes.iter().map(|o| o.result.total_points).sum();
        let total_possible = outcomes.iter().map(|o| o.max_points).sum();
        Self {
            assignment_id,
            attempt_id,
            total_points,
            total_possible,
            outcomes,
        }
    }
}

/// 持久化的单题作答与得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponseRecord {
    pub attempt_id: i64,
    pub question_id: i64,
    pub response: JsonValue,
    pub points: f64,
    pub feedback: Vec<Feedback>,
    pub graded_at: DateTime<Utc>,
}
