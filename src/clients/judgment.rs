//! 评判服务接口
//!
//! 真正给自由作答打分的是外部评判服务（LLM），这里只定义它的形状：
//! 每种作答形态一个评估模型，返回分数与反馈。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clients::extraction::ExtractedContent;
use crate::models::{GradingContext, ImageRef, PresentationRef, Question, RubricScore};

/// 文本作答评估模型
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEvaluation {
    pub question: Question,
    pub learner_response: String,
    pub context: GradingContext,
}

/// 文件作答评估模型
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvaluation {
    pub question: Question,
    pub files: Vec<ExtractedContent>,
    pub context: GradingContext,
}

/// 链接作答评估模型
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlEvaluation {
    pub question: Question,
    pub url: String,
    /// 抓取到的页面 / 仓库内容
    pub url_content: String,
    pub is_functional: bool,
    pub context: GradingContext,
}

/// 图片作答评估模型
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEvaluation {
    pub question: Question,
    pub images: Vec<ImageRef>,
    pub context: GradingContext,
}

/// 演示作答评估模型
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationEvaluation {
    pub question: Question,
    pub presentation: PresentationRef,
    pub context: GradingContext,
}

/// 评判结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgmentResponse {
    pub points: f64,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_scores: Option<Vec<RubricScore>>,
}

/// 外部评判服务
#[async_trait]
pub trait JudgmentService: Send + Sync {
    async fn grade_text_based(
        &self,
        model: &TextEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> anyhow::Result<JudgmentResponse>;

    async fn grade_file_based(
        &self,
        model: &FileEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> anyhow::Result<JudgmentResponse>;

    async fn grade_url_based(
        &self,
        model: &UrlEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> anyhow::Result<JudgmentResponse>;

    async fn grade_image_based(
        &self,
        model: &ImageEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> anyhow::Result<JudgmentResponse>;

    async fn grade_presentation_based(
        &self,
        model: &PresentationEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> anyhow::Result<JudgmentResponse>;
}
