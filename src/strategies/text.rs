//! 文本题策略：交给评判服务打分

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::clients::{JudgmentService, Localizer, TextEvaluation};
use crate::error::GradingError;
use crate::models::{GradingContext, GradingResult, Question, QuestionResponseInput, TypedResponse};
use crate::strategies::{result_from_judgment, unexpected_payload, GradingStrategy};

pub struct TextStrategy {
    judgment: Arc<dyn JudgmentService>,
    localizer: Arc<dyn Localizer>,
}

impl TextStrategy {
    pub fn new(judgment: Arc<dyn JudgmentService>, localizer: Arc<dyn Localizer>) -> Self {
        Self { judgment, localizer }
    }
}

#[async_trait]
impl GradingStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "TextStrategy"
    }

    fn validate(&self, _question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        match &input.learner_text_response {
            Some(text) if !text.trim().is_empty() => Ok(()),
            _ => Err(GradingError::validation(self.localizer.get_localized_string(
                "emptyTextResponse",
                &input.language,
                &[],
            ))),
        }
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        input
            .learner_text_response
            .as_ref()
            .map(|text| TypedResponse::Text(text.trim().to_string()))
            .ok_or_else(|| GradingError::extraction("learnerTextResponse is missing"))
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Text(text) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };

        let model = TextEvaluation {
            question: question.clone(),
            learner_response: text.clone(),
            context: context.clone(),
        };

        debug!("题目 {} 提交文本评判 ({} 字符)", question.id, text.chars().count());
        let judgment = self
            .judgment
            .grade_text_based(&model, context.assignment_id, &context.language)
            .await
            .map_err(|e| GradingError::judgment(question.id, e))?;

        Ok(result_from_judgment(question, judgment, self.name()))
    }
}
