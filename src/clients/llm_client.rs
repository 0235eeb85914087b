//! LLM 评判客户端
//!
//! `JudgmentService` 的 async-openai 实现：按作答形态构建提示词，
//! 要求模型返回 JSON 判定 `{points, feedback, rationale?, rubricScores?}`，
//! 宽松解析（代码块、前后说明文字），失败时重试。
//!
//! 兼容 OpenAI API 的服务都可以使用（自定义 base url 与模型）。

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clients::judgment::{
    FileEvaluation, ImageEvaluation, JudgmentResponse, JudgmentService, PresentationEvaluation,
    TextEvaluation, UrlEvaluation,
};
use crate::config::Config;
use crate::models::{GradingContext, Question, RubricScore};
use crate::utils::truncate_text;

/// 单个文件写入提示词的最大字符数
const MAX_FILE_CHARS: usize = 8_000;

const SYSTEM_PROMPT: &str = "You are an impartial grader for course assignments. \
Grade strictly against the question, its rubrics and the assignment instructions. \
Respond with a single JSON object only: \
{\"points\": number, \"feedback\": string, \"rationale\": string, \
\"rubricScores\": [{\"rubricIndex\": number, \"points\": number, \"justification\": string}]}. \
Include rubricScores only when rubrics are provided. Write the feedback in the requested language.";

/// LLM 评判客户端
pub struct LlmJudgmentClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_retries: usize,
}

impl LlmJudgmentClient {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_retries: config.llm_max_retries.max(1),
        }
    }

    /// 通用的 LLM 调用
    ///
    /// `imgs` 非空时使用多模态消息，把图片作为 image_url 片段追加在文本之后
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        imgs: Option<&[String]>,
    ) -> Result<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = match imgs {
            Some(img_urls) if !img_urls.is_empty() => {
                let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                    vec![ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText {
                            text: user_message.to_string(),
                        },
                    )];

                for url in img_urls {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::Auto),
                            },
                        },
                    ));
                }

                debug!("使用 Vision API，包含 {} 张图片", img_urls.len());
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                    .build()?
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?,
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(1536u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }

    /// 调用并解析判定，失败时按配置次数重试
    async fn judge(&self, user_message: &str, imgs: Option<&[String]>) -> Result<JudgmentResponse> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            let outcome = match self.send_to_llm(user_message, Some(SYSTEM_PROMPT), imgs).await {
                Ok(raw) => parse_judgment_response(&raw),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(judgment) => return Ok(judgment),
                Err(e) => {
                    warn!("⚠️ 第 {}/{} 次评判失败: {}", attempt, self.max_retries, e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("评判未执行")))
    }
}

#[async_trait]
impl JudgmentService for LlmJudgmentClient {
    async fn grade_text_based(
        &self,
        model: &TextEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> Result<JudgmentResponse> {
        let body = format!("Learner response:\n{}", model.learner_response);
        let prompt = build_prompt(&model.question, &model.context, assignment_id, language, &body);
        self.judge(&prompt, None).await
    }

    async fn grade_file_based(
        &self,
        model: &FileEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> Result<JudgmentResponse> {
        let mut body = String::from("Learner submitted files:\n");
        for file in &model.files {
            body.push_str(&format!(
                "\n--- {} ({}, {:?}) ---\n{}\n",
                file.filename,
                file.metadata.mime_type,
                file.metadata.status,
                truncate_text(&file.content, MAX_FILE_CHARS)
            ));
        }
        let prompt = build_prompt(&model.question, &model.context, assignment_id, language, &body);
        self.judge(&prompt, None).await
    }

    async fn grade_url_based(
        &self,
        model: &UrlEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> Result<JudgmentResponse> {
        let body = format!(
            "Learner submitted URL: {}\nURL reachable: {}\nFetched content:\n{}",
            model.url,
            model.is_functional,
            truncate_text(&model.url_content, MAX_FILE_CHARS)
        );
        let prompt = build_prompt(&model.question, &model.context, assignment_id, language, &body);
        self.judge(&prompt, None).await
    }

    async fn grade_image_based(
        &self,
        model: &ImageEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> Result<JudgmentResponse> {
        let urls: Vec<String> = model
            .images
            .iter()
            .filter_map(|image| match (&image.image_url, &image.image_data) {
                (Some(url), _) if !url.trim().is_empty() => Some(url.clone()),
                (_, Some(data)) if !data.trim().is_empty() => Some(as_data_url(
                    data,
                    image.mime_type.as_deref().unwrap_or("image/png"),
                )),
                _ => None,
            })
            .collect();

        let names: Vec<&str> = model.images.iter().map(|i| i.filename.as_str()).collect();
        let body = format!(
            "Learner submitted {} image(s): {}\nState the awarded score in the feedback as \"Score: N\".",
            names.len(),
            names.join(", ")
        );
        let prompt = build_prompt(&model.question, &model.context, assignment_id, language, &body);
        self.judge(&prompt, Some(&urls)).await
    }

    async fn grade_presentation_based(
        &self,
        model: &PresentationEvaluation,
        assignment_id: i64,
        language: &str,
    ) -> Result<JudgmentResponse> {
        let presentation = &model.presentation;
        let mut body = String::from("Learner presentation:\n");
        if let Some(transcript) = &presentation.transcript {
            body.push_str(&format!("Transcript:\n{}\n", truncate_text(transcript, MAX_FILE_CHARS)));
        }
        for (i, slide) in presentation.slides.iter().enumerate() {
            body.push_str(&format!("Slide {}: {}\n", i + 1, slide));
        }
        if let Some(url) = &presentation.recording_url {
            body.push_str(&format!("Recording: {}\n", url));
        }
        let prompt = build_prompt(&model.question, &model.context, assignment_id, language, &body);
        self.judge(&prompt, None).await
    }
}

/// 构建评判提示词：题目、满分、细则、作业说明、上下文作答，最后是本题作答
pub fn build_prompt(
    question: &Question,
    context: &GradingContext,
    assignment_id: i64,
    language: &str,
    response_section: &str,
) -> String {
    let mut prompt = format!(
        "Assignment #{}\nFeedback language: {}\n\nQuestion ({} points):\n{}\n",
        assignment_id, language, question.total_points, question.question
    );

    if !context.assignment_instructions.trim().is_empty() {
        prompt.push_str(&format!(
            "\nAssignment instructions:\n{}\n",
            context.assignment_instructions
        ));
    }

    let rubrics = question.rubrics();
    if !rubrics.is_empty() {
        prompt.push_str("\nRubrics (award exactly one listed value per rubric):\n");
        for (index, rubric) in rubrics.iter().enumerate() {
            let levels: Vec<String> = rubric
                .criteria
                .iter()
                .map(|c| format!("{} = {}", c.points, c.description))
                .collect();
            prompt.push_str(&format!(
                "{}. {} [{}]\n",
                index,
                rubric.rubric_question,
                levels.join("; ")
            ));
        }
    }

    if !context.question_answer_context.is_empty() {
        prompt.push_str("\nLearner's answers to related questions:\n");
        for item in &context.question_answer_context {
            prompt.push_str(&format!("Q: {}\nA: {}\n", item.question, item.answer));
        }
    }

    prompt.push('\n');
    prompt.push_str(response_section);
    prompt
}

/// 宽松解析模型输出
///
/// 接受代码块包裹、前后夹带说明文字的 JSON；`points` 可以是数字或数字字符串
pub fn parse_judgment_response(raw: &str) -> Result<JudgmentResponse> {
    let start = raw.find('{').context("评判结果中没有 JSON 对象")?;
    let end = raw.rfind('}').context("评判结果中没有 JSON 对象")?;
    if end < start {
        anyhow::bail!("评判结果 JSON 不完整");
    }

    let value: JsonValue =
        serde_json::from_str(&raw[start..=end]).context("评判结果 JSON 解析失败")?;

    let points = value
        .get("points")
        .or_else(|| value.get("score"))
        .and_then(as_number)
        .context("评判结果缺少 points")?;

    let feedback = value
        .get("feedback")
        .and_then(|f| f.as_str())
        .unwrap_or_default()
        .to_string();

    let rationale = value
        .get("rationale")
        .and_then(|r| r.as_str())
        .map(str::to_string);

    let rubric_scores = value
        .get("rubricScores")
        .and_then(|r| r.as_array())
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| {
                    let points = item.get("points").and_then(as_number)?;
                    let rubric_index = item
                        .get("rubricIndex")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as usize)
                        .unwrap_or(i);
                    Some(RubricScore {
                        rubric_index,
                        points,
                        justification: item
                            .get("justification")
                            .and_then(|j| j.as_str())
                            .map(str::to_string),
                    })
                })
                .collect::<Vec<_>>()
        });

    Ok(JudgmentResponse {
        points,
        feedback,
        rationale,
        rubric_scores,
    })
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_data_url(data: &str, mime_type: &str) -> String {
    if data.starts_with("data:") {
        data.to_string()
    } else {
        format!("data:{};base64,{}", mime_type, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionAnswerContext, QuestionType, Rubric, RubricCriterion, Scoring, ScoringType, UserRole};
    use serde_json::Map;

    fn question() -> Question {
        Question {
            id: 1,
            question: "Explain ownership".into(),
            question_type: QuestionType::Text,
            response_type: None,
            total_points: 10.0,
            choices: vec![],
            scoring: Some(Scoring {
                scoring_type: ScoringType::Criteria,
                rubrics: vec![Rubric {
                    rubric_question: "Accuracy".into(),
                    criteria: vec![
                        RubricCriterion { description: "wrong".into(), points: 0.0 },
                        RubricCriterion { description: "right".into(), points: 10.0 },
                    ],
                }],
            }),
            grading_context_question_ids: vec![],
        }
    }

    fn context() -> GradingContext {
        GradingContext {
            assignment_instructions: "Answer briefly.".into(),
            question_answer_context: vec![QuestionAnswerContext {
                question: "What is a borrow?".into(),
                answer: "A reference".into(),
            }],
            assignment_id: 9,
            language: "en".into(),
            user_role: UserRole::Learner,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = "Here is my verdict:\n```json\n{\"points\": \"7.5\", \"feedback\": \"Solid\", \"rationale\": \"ok\"}\n```";
        let judgment = parse_judgment_response(raw).unwrap();
        assert_eq!(judgment.points, 7.5);
        assert_eq!(judgment.feedback, "Solid");
        assert_eq!(judgment.rationale.as_deref(), Some("ok"));
        assert!(judgment.rubric_scores.is_none());
    }

    #[test]
    fn test_parse_rubric_scores() {
        let raw = r#"{"points": 4, "feedback": "f", "rubricScores": [{"points": 3}, {"rubricIndex": 1, "points": "1"}]}"#;
        let judgment = parse_judgment_response(raw).unwrap();
        let scores = judgment.rubric_scores.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].rubric_index, 0);
        assert_eq!(scores[1].rubric_index, 1);
        assert_eq!(scores[1].points, 1.0);
    }

    #[test]
    fn test_parse_rejects_missing_points() {
        assert!(parse_judgment_response("no json here").is_err());
        assert!(parse_judgment_response(r#"{"feedback": "x"}"#).is_err());
    }

    #[test]
    fn test_prompt_contains_rubrics_and_context() {
        let prompt = build_prompt(&question(), &context(), 9, "en", "Learner response:\nmoves");
        assert!(prompt.contains("Question (10 points)"));
        assert!(prompt.contains("0. Accuracy [0 = wrong; 10 = right]"));
        assert!(prompt.contains("Q: What is a borrow?"));
        assert!(prompt.ends_with("Learner response:\nmoves"));
    }

    #[tokio::test]
    #[ignore] // 需要真实的 LLM 服务
    async fn test_grade_text_live() {
        let client = LlmJudgmentClient::new(&Config::from_env());
        let model = TextEvaluation {
            question: question(),
            learner_response: "Each value has a single owner.".into(),
            context: context(),
        };
        let judgment = client.grade_text_based(&model, 9, "en").await.unwrap();
        assert!(judgment.points >= 0.0);
    }
}
