//! 作答数据结构
//!
//! `QuestionResponseInput` 是学习者提交的原始作答，交给策略后不再修改；
//! `TypedResponse` 是策略 `extract` 之后的规范化载荷。

use serde::{Deserialize, Serialize};

use crate::models::question::Question;

/// 文件引用：存储键 + 桶，或外链（GitHub）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileRef {
    /// 存储定位信息是否完整
    pub fn has_storage_location(&self) -> bool {
        non_blank(&self.key) && non_blank(&self.bucket)
    }

    /// 外链定位信息是否完整
    pub fn has_github_location(&self) -> bool {
        non_blank(&self.github_url)
    }
}

/// 图片引用：内联数据 / URL，或存储键 + 桶
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ImageRef {
    pub fn has_inline_source(&self) -> bool {
        non_blank(&self.image_data) || non_blank(&self.image_url)
    }

    pub fn has_storage_location(&self) -> bool {
        non_blank(&self.key) && non_blank(&self.bucket)
    }
}

/// 演示 / 录制作答
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default)]
    pub slides: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
}

impl PresentationRef {
    pub fn is_empty(&self) -> bool {
        !non_blank(&self.transcript)
            && self.slides.iter().all(|s| s.trim().is_empty())
            && !non_blank(&self.recording_url)
    }
}

/// 判断题作答：布尔值或需要按语言解析的字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BooleanAnswer {
    Bool(bool),
    Text(String),
}

/// 单道题的原始作答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponseInput {
    pub question_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_text_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_answer_choice: Option<BooleanAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_url_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_file_response: Option<Vec<FileRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_image_response: Option<Vec<ImageRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_presentation_response: Option<PresentationRef>,
    /// 为空表示沿用整份提交的语言
    #[serde(default)]
    pub language: String,
    /// 作者预览时由调用方提供的题目
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_override: Option<Question>,
}

fn default_language() -> String {
    "en".to_string()
}

impl QuestionResponseInput {
    /// 创建只带题号的空作答
    pub fn new(question_id: i64) -> Self {
        Self {
            question_id,
            learner_text_response: None,
            learner_choices: None,
            learner_answer_choice: None,
            learner_url_response: None,
            learner_file_response: None,
            learner_image_response: None,
            learner_presentation_response: None,
            language: default_language(),
            question_override: None,
        }
    }

    /// 所有作答字段均为空
    pub fn is_empty(&self) -> bool {
        let answer_empty = match &self.learner_answer_choice {
            None => true,
            Some(BooleanAnswer::Bool(_)) => false,
            Some(BooleanAnswer::Text(s)) => s.trim().is_empty(),
        };

        !non_blank(&self.learner_text_response)
            && self.learner_choices.as_ref().map_or(true, |c| c.is_empty())
            && answer_empty
            && !non_blank(&self.learner_url_response)
            && self.learner_file_response.as_ref().map_or(true, |f| f.is_empty())
            && self.learner_image_response.as_ref().map_or(true, |i| i.is_empty())
            && self
                .learner_presentation_response
                .as_ref()
                .map_or(true, |p| p.is_empty())
    }

    /// 用于一致性比对与上下文拼接的文本形式
    pub fn as_comparable_text(&self) -> String {
        if let Some(text) = &self.learner_text_response {
            return text.clone();
        }
        if let Some(choices) = &self.learner_choices {
            return choices.join(", ");
        }
        if let Some(answer) = &self.learner_answer_choice {
            return match answer {
                BooleanAnswer::Bool(b) => b.to_string(),
                BooleanAnswer::Text(s) => s.clone(),
            };
        }
        if let Some(url) = &self.learner_url_response {
            return url.clone();
        }
        if let Some(files) = &self.learner_file_response {
            return files
                .iter()
                .map(|f| f.filename.as_str())
                .collect::<Vec<_>>()
                .join(", ");
        }
        if let Some(images) = &self.learner_image_response {
            return images
                .iter()
                .map(|i| i.filename.as_str())
                .collect::<Vec<_>>()
                .join(", ");
        }
        if let Some(presentation) = &self.learner_presentation_response {
            return presentation.transcript.clone().unwrap_or_default();
        }
        String::new()
    }
}

/// 策略 extract 之后的规范化作答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TypedResponse {
    Text(String),
    Choices(Vec<String>),
    Boolean(bool),
    Url(String),
    Files(Vec<FileRef>),
    Images(Vec<ImageRef>),
    Presentation(PresentationRef),
}

impl TypedResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            TypedResponse::Text(_) => "text",
            TypedResponse::Choices(_) => "choices",
            TypedResponse::Boolean(_) => "boolean",
            TypedResponse::Url(_) => "url",
            TypedResponse::Files(_) => "files",
            TypedResponse::Images(_) => "images",
            TypedResponse::Presentation(_) => "presentation",
        }
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_ref().map_or(false, |s| !s.trim().is_empty())
}
