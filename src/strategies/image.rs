//! 图片题策略
//!
//! 评判服务对图片的打分经常与反馈里自述的分数不一致，这里做一次对账：
//! 反馈中的分数在范围内且与返回分数相差超过 1 分时，以反馈为准并追加说明；
//! 反馈没提到分数时补一句 "Final Score: X/Y (Z%)"。
//! 另外在缺少鼓励 / 改进语句时补上。

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::{ImageEvaluation, JudgmentService, Localizer};
use crate::error::GradingError;
use crate::models::{
    clamp_points, Feedback, GradingContext, GradingResult, Question, QuestionResponseInput,
    TypedResponse,
};
use crate::strategies::{format_points, result_from_judgment, unexpected_payload, GradingStrategy};

/// 反馈与返回分数允许的差值
const SCORE_TOLERANCE: f64 = 1.0;

const ENCOURAGING_WORDS: &[&str] = &[
    "good", "great", "well done", "excellent", "nice", "strong", "impressive", "effort",
];
const IMPROVEMENT_WORDS: &[&str] = &["improve", "consider", "could", "should", "next time", "review"];

/// 从反馈文本中找出自述分数（取第一处）
pub fn extract_stated_score(feedback: &str) -> Option<f64> {
    let re = Regex::new(
        r"(?i)\b(?:final\s+score|total\s+score|score|awarded|points\s+awarded|grade)\s*(?:of|is|=|:)?\s*(\d+(?:\.\d+)?)",
    )
    .ok()?;
    re.captures(feedback)?.get(1)?.as_str().parse().ok()
}

/// 对账结果
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub points: f64,
    pub feedback: String,
    pub corrected: bool,
}

/// 对账并补充反馈
pub fn reconcile_image_feedback(
    points: f64,
    feedback: &str,
    max_points: f64,
    localizer: &dyn Localizer,
    language: &str,
) -> Reconciled {
    let mut points = clamp_points(points, max_points);
    let mut text = feedback.trim().to_string();
    let mut corrected = false;

    match extract_stated_score(&text) {
        Some(stated)
            if (0.0..=max_points).contains(&stated) && (stated - points).abs() > SCORE_TOLERANCE =>
        {
            info!("图片评分对账：返回 {}，反馈自述 {}，以反馈为准", points, stated);
            points = stated;
            corrected = true;
            push_sentence(
                &mut text,
                &localizer.get_localized_string(
                    "scoreCorrected",
                    language,
                    &[("points", format_points(stated))],
                ),
            );
        }
        Some(_) => {}
        None => {
            let percent = if max_points > 0.0 {
                (points / max_points * 100.0).round()
            } else {
                0.0
            };
            push_sentence(
                &mut text,
                &localizer.get_localized_string(
                    "finalScore",
                    language,
                    &[
                        ("points", format_points(points)),
                        ("max", format_points(max_points)),
                        ("percent", format_points(percent)),
                    ],
                ),
            );
        }
    }

    let lowered = text.to_lowercase();
    if points > 0.0 && !ENCOURAGING_WORDS.iter().any(|w| lowered.contains(w)) {
        text = format!(
            "{} {}",
            localizer.get_localized_string("encouragement", language, &[]),
            text
        );
    }
    if points < max_points && !IMPROVEMENT_WORDS.iter().any(|w| lowered.contains(w)) {
        push_sentence(
            &mut text,
            &localizer.get_localized_string("improvement", language, &[]),
        );
    }

    Reconciled {
        points,
        feedback: text,
        corrected,
    }
}

fn push_sentence(text: &mut String, sentence: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(sentence);
}

pub struct ImageStrategy {
    judgment: Arc<dyn JudgmentService>,
    localizer: Arc<dyn Localizer>,
}

impl ImageStrategy {
    pub fn new(judgment: Arc<dyn JudgmentService>, localizer: Arc<dyn Localizer>) -> Self {
        Self { judgment, localizer }
    }
}

#[async_trait]
impl GradingStrategy for ImageStrategy {
    fn name(&self) -> &'static str {
        "ImageStrategy"
    }

    fn validate(&self, _question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        let images = input.learner_image_response.as_deref().unwrap_or_default();
        if images.is_empty() {
            return Err(GradingError::validation(self.localizer.get_localized_string(
                "noImagesProvided",
                &input.language,
                &[],
            )));
        }

        for image in images {
            let located = image.has_inline_source() || image.has_storage_location();
            if image.filename.trim().is_empty() || !located {
                return Err(GradingError::validation(self.localizer.get_localized_string(
                    "invalidImageReference",
                    &input.language,
                    &[("filename", image.filename.clone())],
                )));
            }
        }
        Ok(())
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        input
            .learner_image_response
            .clone()
            .map(TypedResponse::Images)
            .ok_or_else(|| GradingError::extraction("learnerImageResponse is missing"))
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Images(images) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };

        debug!("题目 {} 提交图片评判 ({} 张)", question.id, images.len());
        let model = ImageEvaluation {
            question: question.clone(),
            images: images.clone(),
            context: context.clone(),
        };
        let judgment = self
            .judgment
            .grade_image_based(&model, context.assignment_id, &context.language)
            .await
            .map_err(|e| GradingError::judgment(question.id, e))?;

        let base = result_from_judgment(question, judgment, self.name());
        let reconciled = reconcile_image_feedback(
            base.total_points,
            &base.feedback_text(),
            question.total_points,
            self.localizer.as_ref(),
            &context.language,
        );

        let mut result = GradingResult::new(reconciled.points, vec![Feedback::new(reconciled.feedback)]);
        result.metadata = base.metadata;
        Ok(result
            .with_metadata("imageCount", images.len())
            .with_metadata("scoreCorrected", reconciled.corrected)
            .clamped(question.total_points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::StaticLocalizer;
    use crate::models::{ImageRef, QuestionType};
    use crate::strategies::test_support::{context, deps, question, FixedJudgment};

    #[test]
    fn test_extract_stated_score() {
        assert_eq!(extract_stated_score("Nice diagram. Score: 7/10"), Some(7.0));
        assert_eq!(extract_stated_score("Points awarded 3.5 for labels"), Some(3.5));
        assert_eq!(extract_stated_score("No numbers here"), None);
    }

    #[test]
    fn test_feedback_score_wins_when_far_apart() {
        let localizer = StaticLocalizer::new();
        let reconciled =
            reconcile_image_feedback(3.0, "Great chart. Score: 8", 10.0, &localizer, "en");
        assert_eq!(reconciled.points, 8.0);
        assert!(reconciled.corrected);
        assert!(reconciled.feedback.contains("adjusted to 8"));
        assert!(reconciled.feedback.contains("improve"));
    }

    #[test]
    fn test_close_or_out_of_range_score_is_kept() {
        let localizer = StaticLocalizer::new();
        let reconciled =
            reconcile_image_feedback(7.5, "Good work, score: 8", 10.0, &localizer, "en");
        assert_eq!(reconciled.points, 7.5);
        assert!(!reconciled.corrected);

        let reconciled =
            reconcile_image_feedback(4.0, "Good work, score: 40", 10.0, &localizer, "en");
        assert_eq!(reconciled.points, 4.0);
        assert!(!reconciled.corrected);
    }

    #[test]
    fn test_final_score_and_tone_are_appended() {
        let localizer = StaticLocalizer::new();
        let reconciled = reconcile_image_feedback(6.0, "Labels are missing.", 8.0, &localizer, "en");
        assert_eq!(reconciled.points, 6.0);
        assert!(reconciled.feedback.starts_with("Good effort!"));
        assert!(reconciled.feedback.contains("Final Score: 6/8 (75%)."));
        assert!(reconciled.feedback.ends_with("improve your answer."));
    }

    #[tokio::test]
    async fn test_image_grading_end_to_end() {
        let judge = Arc::new(FixedJudgment::new(2.0, "Excellent sketch. Score: 9"));
        let deps = deps(judge);
        let strategy = ImageStrategy::new(deps.judgment, deps.localizer);
        let q = question(1, QuestionType::Upload, 10.0);

        let mut input = QuestionResponseInput::new(1);
        input.learner_image_response = Some(vec![ImageRef {
            filename: "sketch.png".into(),
            image_url: Some("https://cdn.example.com/sketch.png".into()),
            ..Default::default()
        }]);
        strategy.validate(&q, &input).unwrap();
        let response = strategy.extract(&input).unwrap();

        let result = strategy.grade(&q, &response, &context()).await.unwrap();
        assert_eq!(result.total_points, 9.0);
        assert_eq!(result.metadata["scoreCorrected"], true);
        assert_eq!(result.metadata["strategy"], "ImageStrategy");
    }

    #[test]
    fn test_image_without_source_is_rejected() {
        let deps = deps(Arc::new(FixedJudgment::new(0.0, "")));
        let strategy = ImageStrategy::new(deps.judgment, deps.localizer);
        let mut input = QuestionResponseInput::new(1);
        input.learner_image_response = Some(vec![ImageRef {
            filename: "x.png".into(),
            ..Default::default()
        }]);
        assert!(strategy
            .validate(&question(1, QuestionType::Upload, 1.0), &input)
            .is_err());
    }
}
