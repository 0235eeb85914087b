//! 链接题策略
//!
//! 先抓取链接内容（GitHub 链接走回退链），再交给评判服务。
//! 全部抓取方式失败时不报错，直接给 0 分并标记审计策略名为 `UrlStrategy-Failed`。

use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::{JudgmentService, Localizer, UrlEvaluation, UrlFetcher};
use crate::error::GradingError;
use crate::models::{GradingContext, GradingResult, Question, QuestionResponseInput, TypedResponse};
use crate::strategies::{result_from_judgment, unexpected_payload, GradingStrategy, AUDIT_STRATEGY_KEY};

/// 抓取失败时写入审计的策略名
pub const FAILED_URL_STRATEGY_NAME: &str = "UrlStrategy-Failed";

pub struct UrlStrategy {
    judgment: Arc<dyn JudgmentService>,
    fetcher: Arc<dyn UrlFetcher>,
    localizer: Arc<dyn Localizer>,
}

impl UrlStrategy {
    pub fn new(
        judgment: Arc<dyn JudgmentService>,
        fetcher: Arc<dyn UrlFetcher>,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            judgment,
            fetcher,
            localizer,
        }
    }
}

#[async_trait]
impl GradingStrategy for UrlStrategy {
    fn name(&self) -> &'static str {
        "UrlStrategy"
    }

    fn validate(&self, _question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        let raw = input
            .learner_url_response
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if raw.is_empty() {
            return Err(GradingError::validation(self.localizer.get_localized_string(
                "emptyUrlResponse",
                &input.language,
                &[],
            )));
        }

        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
            _ => Err(GradingError::validation(self.localizer.get_localized_string(
                "invalidUrl",
                &input.language,
                &[("url", raw.to_string())],
            ))),
        }
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        input
            .learner_url_response
            .as_ref()
            .map(|url| TypedResponse::Url(url.trim().to_string()))
            .ok_or_else(|| GradingError::extraction("learnerUrlResponse is missing"))
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Url(url) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };

        let fetched = match self.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("⚠️ 题目 {} 的链接无法访问，记 0 分: {}", question.id, e);
                let feedback = self.localizer.get_localized_string(
                    "urlFetchFailed",
                    &context.language,
                    &[("url", url.clone())],
                );
                return Ok(GradingResult::zero(feedback)
                    .with_metadata("isFunctional", false)
                    .with_metadata("fetchError", e.to_string())
                    .with_metadata(AUDIT_STRATEGY_KEY, FAILED_URL_STRATEGY_NAME));
            }
        };

        info!(
            "题目 {} 链接内容已获取 ({:?}, {} 字符)",
            question.id,
            fetched.source,
            fetched.content.chars().count()
        );

        let model = UrlEvaluation {
            question: question.clone(),
            url: url.clone(),
            url_content: fetched.content,
            is_functional: true,
            context: context.clone(),
        };
        let judgment = self
            .judgment
            .grade_url_based(&model, context.assignment_id, &context.language)
            .await
            .map_err(|e| GradingError::judgment(question.id, e))?;

        Ok(result_from_judgment(question, judgment, self.name())
            .with_metadata("isFunctional", true)
            .with_metadata(
                "contentSource",
                serde_json::to_value(fetched.source).unwrap_or_default(),
            ))
    }
}
