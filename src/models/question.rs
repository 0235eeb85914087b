//! 题目数据结构
//!
//! 题目本身由外部存储提供（学习者路径读取作答变体/翻译后的题目，
//! 作者预览路径使用调用方传入的覆盖题目），本模块只描述形状。

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 题目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    /// 自由文本
    Text,
    /// 单选
    SingleCorrect,
    /// 多选
    MultipleCorrect,
    /// 判断题
    TrueFalse,
    /// 链接
    Url,
    /// 上传（文件 / 图片 / 演示，由 `ResponseType` 决定）
    Upload,
    /// 外链文件（如 GitHub 仓库中的文件）
    LinkFile,
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QuestionType::Text => "TEXT",
            QuestionType::SingleCorrect => "SINGLE_CORRECT",
            QuestionType::MultipleCorrect => "MULTIPLE_CORRECT",
            QuestionType::TrueFalse => "TRUE_FALSE",
            QuestionType::Url => "URL",
            QuestionType::Upload => "UPLOAD",
            QuestionType::LinkFile => "LINK_FILE",
        };
        write!(f, "{}", name)
    }
}

/// 作答类型（次级判别字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    Essay,
    Code,
    Report,
    Repo,
    Images,
    Presentation,
    LiveRecording,
    Other,
}

impl Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseType::Essay => "ESSAY",
            ResponseType::Code => "CODE",
            ResponseType::Report => "REPORT",
            ResponseType::Repo => "REPO",
            ResponseType::Images => "IMAGES",
            ResponseType::Presentation => "PRESENTATION",
            ResponseType::LiveRecording => "LIVE_RECORDING",
            ResponseType::Other => "OTHER",
        };
        write!(f, "{}", name)
    }
}

/// 计分方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoringType {
    /// 按评分细则打分
    Criteria,
    /// 多选题：每选错一项扣除该项分值
    LossPerMistake,
    /// 完全交给评判服务
    AiGraded,
}

/// 选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub choice: String,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// 评分细则中的一个档位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricCriterion {
    pub description: String,
    pub points: f64,
}

/// 评分细则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub rubric_question: String,
    pub criteria: Vec<RubricCriterion>,
}

impl Rubric {
    /// 该细则允许的分值集合
    pub fn valid_points(&self) -> Vec<f64> {
        self.criteria.iter().map(|c| c.points).collect()
    }

    /// 该细则的最高分
    pub fn max_points(&self) -> f64 {
        self.criteria
            .iter()
            .map(|c| c.points)
            .fold(0.0_f64, f64::max)
    }
}

/// 计分设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoring {
    #[serde(rename = "type")]
    pub scoring_type: ScoringType,
    #[serde(default)]
    pub rubrics: Vec<Rubric>,
}

/// 题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    /// 题干
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    pub total_points: f64,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<Scoring>,
    /// 作为本题评分上下文的其它题目
    #[serde(default)]
    pub grading_context_question_ids: Vec<i64>,
}

impl Question {
    /// 是否使用"错一扣一"计分
    pub fn is_loss_per_mistake(&self) -> bool {
        matches!(
            self.scoring.as_ref().map(|s| s.scoring_type),
            Some(ScoringType::LossPerMistake)
        )
    }

    /// 评分细则（无则为空）
    pub fn rubrics(&self) -> &[Rubric] {
        self.scoring
            .as_ref()
            .map(|s| s.rubrics.as_slice())
            .unwrap_or(&[])
    }

    /// 所有正确选项分值之和
    pub fn correct_points_sum(&self) -> f64 {
        self.choices
            .iter()
            .filter(|c| c.is_correct)
            .map(|c| c.points)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_question_with_scoring() {
        let json = r#"{
            "id": 7,
            "question": "Pick the primes",
            "type": "MULTIPLE_CORRECT",
            "totalPoints": 5,
            "choices": [
                {"choice": "2", "points": 5, "isCorrect": true},
                {"choice": "4", "points": 3, "isCorrect": false}
            ],
            "scoring": {"type": "LOSS_PER_MISTAKE"}
        }"#;

        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.question_type, QuestionType::MultipleCorrect);
        assert!(question.is_loss_per_mistake());
        assert_eq!(question.correct_points_sum(), 5.0);
        assert!(question.rubrics().is_empty());
    }

    #[test]
    fn test_rubric_max_points() {
        let rubric = Rubric {
            rubric_question: "Clarity".to_string(),
            criteria: vec![
                RubricCriterion { description: "poor".into(), points: 0.0 },
                RubricCriterion { description: "good".into(), points: 3.0 },
                RubricCriterion { description: "ok".into(), points: 1.5 },
            ],
        };
        assert_eq!(rubric.max_points(), 3.0);
        assert_eq!(rubric.valid_points(), vec![0.0, 3.0, 1.5]);
    }
}
