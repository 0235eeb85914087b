//! 评分上下文与评分结果

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// 调用方角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Learner,
    Author,
}

/// 评分上下文中的一组（题目, 既往作答）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswerContext {
    pub question: String,
    pub answer: String,
}

/// 单题评分上下文（只读，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingContext {
    pub assignment_instructions: String,
    pub question_answer_context: Vec<QuestionAnswerContext>,
    pub assignment_id: i64,
    pub language: String,
    pub user_role: UserRole,
    /// attemptId / questionType 等
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl GradingContext {
    pub fn is_author_preview(&self) -> bool {
        self.user_role == UserRole::Author
    }
}

/// 一条反馈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    pub feedback: String,
}

impl Feedback {
    pub fn new(feedback: impl Into<String>) -> Self {
        Self {
            choice: None,
            feedback: feedback.into(),
        }
    }

    pub fn for_choice(choice: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            choice: Some(choice.into()),
            feedback: feedback.into(),
        }
    }
}

/// 单条细则得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricScore {
    pub rubric_index: usize,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// 单题评分结果
///
/// 不变式：`0 <= total_points <= question.total_points`，由策略在返回前保证
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub total_points: f64,
    pub feedback: Vec<Feedback>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl GradingResult {
    pub fn new(total_points: f64, feedback: Vec<Feedback>) -> Self {
        Self {
            total_points,
            feedback,
            metadata: Map::new(),
        }
    }

    /// 零分结果
    pub fn zero(feedback: impl Into<String>) -> Self {
        Self::new(0.0, vec![Feedback::new(feedback)])
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// 把分数限制到 [0, max_points]
    pub fn clamped(mut self, max_points: f64) -> Self {
        self.total_points = clamp_points(self.total_points, max_points);
        self
    }

    /// 所有反馈拼接为一段文本
    pub fn feedback_text(&self) -> String {
        self.feedback
            .iter()
            .map(|f| f.feedback.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 把分数限制到 [0, max_points]，NaN 视为 0
pub fn clamp_points(points: f64, max_points: f64) -> f64 {
    if points.is_nan() {
        return 0.0;
    }
    points.max(0.0).min(max_points.max(0.0))
}
