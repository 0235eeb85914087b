//! 演示 / 录制题策略：讲稿、幻灯片文本或录制链接，交给评判服务

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::clients::{JudgmentService, Localizer, PresentationEvaluation};
use crate::error::GradingError;
use crate::models::{GradingContext, GradingResult, Question, QuestionResponseInput, TypedResponse};
use crate::strategies::{result_from_judgment, unexpected_payload, GradingStrategy};

pub struct PresentationStrategy {
    judgment: Arc<dyn JudgmentService>,
    localizer: Arc<dyn Localizer>,
}

impl PresentationStrategy {
    pub fn new(judgment: Arc<dyn JudgmentService>, localizer: Arc<dyn Localizer>) -> Self {
        Self { judgment, localizer }
    }
}

#[async_trait]
impl GradingStrategy for PresentationStrategy {
    fn name(&self) -> &'static str {
        "PresentationStrategy"
    }

    fn validate(&self, _question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        match &input.learner_presentation_response {
            Some(presentation) if !presentation.is_empty() => Ok(()),
            _ => Err(GradingError::validation(self.localizer.get_localized_string(
                "emptyPresentation",
                &input.language,
                &[],
            ))),
        }
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        let mut presentation = input
            .learner_presentation_response
            .clone()
            .ok_or_else(|| GradingError::extraction("learnerPresentationResponse is missing"))?;
        presentation.slides.retain(|s| !s.trim().is_empty());
        Ok(TypedResponse::Presentation(presentation))
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Presentation(presentation) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };

        debug!(
            "题目 {} 提交演示评判 ({} 张幻灯片)",
            question.id,
            presentation.slides.len()
        );
        let model = PresentationEvaluation {
            question: question.clone(),
            presentation: presentation.clone(),
            context: context.clone(),
        };
        let judgment = self
            .judgment
            .grade_presentation_based(&model, context.assignment_id, &context.language)
            .await
            .map_err(|e| GradingError::judgment(question.id, e))?;

        Ok(result_from_judgment(question, judgment, self.name())
            .with_metadata("slideCount", presentation.slides.len())
            .with_metadata("hasRecording", presentation.recording_url.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PresentationRef, QuestionType};
    use crate::strategies::test_support::{context, deps, question, FixedJudgment};

    #[tokio::test]
    async fn test_presentation_flow() {
        let judge = Arc::new(FixedJudgment::new(6.0, "Clear delivery"));
        let deps = deps(judge.clone());
        let strategy = PresentationStrategy::new(deps.judgment, deps.localizer);
        let q = question(1, QuestionType::Upload, 8.0);

        let mut input = QuestionResponseInput::new(1);
        input.learner_presentation_response = Some(PresentationRef {
            transcript: Some("Today I will talk about lifetimes.".into()),
            slides: vec!["Intro".into(), "  ".into(), "Borrowing".into()],
            recording_url: None,
        });
        strategy.validate(&q, &input).unwrap();
        let response = strategy.extract(&input).unwrap();

        let result = strategy.grade(&q, &response, &context()).await.unwrap();
        assert_eq!(result.total_points, 6.0);
        assert_eq!(result.metadata["slideCount"], 2);
        assert_eq!(judge.seen.lock().unwrap()[0], "Today I will talk about lifetimes.");
    }

    #[test]
    fn test_empty_presentation_is_rejected() {
        let deps = deps(Arc::new(FixedJudgment::new(0.0, "")));
        let strategy = PresentationStrategy::new(deps.judgment, deps.localizer);
        let mut input = QuestionResponseInput::new(1);
        input.learner_presentation_response = Some(PresentationRef::default());
        let err = strategy
            .validate(&question(1, QuestionType::Upload, 1.0), &input)
            .unwrap_err();
        assert!(err.to_string().contains("transcript"));
    }
}
