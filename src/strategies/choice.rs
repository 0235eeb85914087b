//! 选择题策略（单选 / 多选）
//!
//! 本地计分，不调用评判服务。选项匹配前统一归一化：去首尾空白、小写、去标点。

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::clients::Localizer;
use crate::error::GradingError;
use crate::models::{
    clamp_points, Choice, Feedback, GradingContext, GradingResult, Question,
    QuestionResponseInput, TypedResponse,
};
use crate::strategies::{format_points, unexpected_payload, GradingStrategy};

/// 选项归一化：小写、去标点、合并空白
pub fn normalize_choice(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !is_unicode_punctuation(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_unicode_punctuation(c: char) -> bool {
    matches!(c, '“' | '”' | '‘' | '’' | '，' | '。' | '、' | '；' | '：' | '！' | '？' | '（' | '）')
}

fn find_choice<'a>(question: &'a Question, selection: &str) -> Option<(usize, &'a Choice)> {
    let wanted = normalize_choice(selection);
    if wanted.is_empty() {
        return None;
    }
    question
        .choices
        .iter()
        .enumerate()
        .find(|(_, c)| normalize_choice(&c.choice) == wanted)
}

fn validate_choices(
    localizer: &dyn Localizer,
    question: &Question,
    input: &QuestionResponseInput,
) -> Result<(), GradingError> {
    if input.learner_choices.is_none() {
        return Err(GradingError::validation(localizer.get_localized_string(
            "noChoicesProvided",
            &input.language,
            &[],
        )));
    }
    if question.choices.is_empty() {
        return Err(GradingError::internal(question.id, "题目没有配置选项"));
    }
    Ok(())
}

fn extract_choices(input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
    let choices = input
        .learner_choices
        .clone()
        .ok_or_else(|| GradingError::extraction("learnerChoices is missing"))?;
    Ok(TypedResponse::Choices(
        choices.into_iter().filter(|c| !c.trim().is_empty()).collect(),
    ))
}

/// 单选题
pub struct SingleChoiceStrategy {
    localizer: Arc<dyn Localizer>,
}

impl SingleChoiceStrategy {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self { localizer }
    }
}

#[async_trait]
impl GradingStrategy for SingleChoiceStrategy {
    fn name(&self) -> &'static str {
        "SingleChoiceStrategy"
    }

    fn validate(&self, question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        validate_choices(self.localizer.as_ref(), question, input)
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        extract_choices(input)
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Choices(selected) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };
        let lang = context.language.as_str();

        let Some(selection) = selected.first() else {
            return Ok(GradingResult::zero(self.localizer.get_localized_string(
                "noOptionSelected",
                lang,
                &[],
            ))
            .with_metadata("selectionStatus", "none"));
        };

        let Some((index, choice)) = find_choice(question, selection) else {
            debug!("题目 {} 的选择 \"{}\" 不在选项中", question.id, selection);
            return Ok(GradingResult::new(
                0.0,
                vec![Feedback::for_choice(
                    selection.clone(),
                    self.localizer.get_localized_string(
                        "invalidSelection",
                        lang,
                        &[("selection", selection.clone())],
                    ),
                )],
            )
            .with_metadata("selectionStatus", "invalid"));
        };

        let (points, key) = if choice.is_correct {
            (choice.points, "correctSelection")
        } else {
            (0.0, "incorrectSelection")
        };

        let mut feedback = vec![Feedback::for_choice(
            choice.choice.clone(),
            self.localizer
                .get_localized_string(key, lang, &[("choice", choice.choice.clone())]),
        )];
        if let Some(extra) = choice.feedback.as_ref().filter(|f| !f.trim().is_empty()) {
            feedback.push(Feedback::for_choice(choice.choice.clone(), extra.clone()));
        }

        Ok(GradingResult::new(points, feedback)
            .with_metadata("selectionStatus", "matched")
            .with_metadata("selectedIndex", index)
            .with_metadata("isCorrect", choice.is_correct)
            .clamped(question.total_points))
    }
}

/// 多选题
///
/// 正确选项累加分值；"错一扣一"计分下，选中的错误选项扣除其分值。
/// 总分限制在 `[0, 正确选项分值之和]`
pub struct MultipleChoiceStrategy {
    localizer: Arc<dyn Localizer>,
}

impl MultipleChoiceStrategy {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self { localizer }
    }
}

#[async_trait]
impl GradingStrategy for MultipleChoiceStrategy {
    fn name(&self) -> &'static str {
        "MultipleChoiceStrategy"
    }

    fn validate(&self, question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        validate_choices(self.localizer.as_ref(), question, input)
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        extract_choices(input)
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Choices(selected) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };
        let lang = context.language.as_str();

        if selected.is_empty() {
            return Ok(GradingResult::zero(self.localizer.get_localized_string(
                "noOptionSelected",
                lang,
                &[],
            )));
        }

        let loss_per_mistake = question.is_loss_per_mistake();
        let mut total = 0.0;
        let mut feedback = Vec::new();
        let mut matched = vec![false; question.choices.len()];
        let mut incorrect_selected = 0usize;
        let mut invalid_selected = 0usize;

        for selection in selected {
            let Some((index, choice)) = find_choice(question, selection) else {
                invalid_selected += 1;
                feedback.push(Feedback::for_choice(
                    selection.clone(),
                    self.localizer.get_localized_string(
                        "invalidSelection",
                        lang,
                        &[("selection", selection.clone())],
                    ),
                ));
                continue;
            };
            // 重复选择只计一次
            if matched[index] {
                continue;
            }
            matched[index] = true;

            let name = choice.choice.clone();
            if choice.is_correct {
                total += choice.points;
                feedback.push(Feedback::for_choice(
                    name.clone(),
                    self.localizer.get_localized_string(
                        "correctChoiceSelected",
                        lang,
                        &[("choice", name), ("points", format_points(choice.points))],
                    ),
                ));
            } else {
                incorrect_selected += 1;
                let text = if loss_per_mistake {
                    total -= choice.points;
                    self.localizer.get_localized_string(
                        "incorrectChoicePenalty",
                        lang,
                        &[("choice", name.clone()), ("points", format_points(choice.points))],
                    )
                } else {
                    self.localizer.get_localized_string(
                        "incorrectChoiceSelected",
                        lang,
                        &[("choice", name.clone())],
                    )
                };
                feedback.push(Feedback::for_choice(name, text));
            }
        }

        let mut all_correct_selected = true;
        for (index, choice) in question.choices.iter().enumerate() {
            if choice.is_correct && !matched[index] {
                all_correct_selected = false;
                feedback.push(Feedback::for_choice(
                    choice.choice.clone(),
                    self.localizer.get_localized_string(
                        "missedCorrectChoice",
                        lang,
                        &[("choice", choice.choice.clone())],
                    ),
                ));
            }
        }

        let no_incorrect_selected = incorrect_selected == 0;
        let perfect = all_correct_selected && no_incorrect_selected && invalid_selected == 0;
        if perfect {
            feedback.push(Feedback::new(self.localizer.get_localized_string(
                "allCorrectSelected",
                lang,
                &[],
            )));
        }

        let total = clamp_points(total, question.correct_points_sum());
        Ok(GradingResult::new(total, feedback)
            .with_metadata("allCorrectSelected", all_correct_selected)
            .with_metadata("noIncorrectSelected", no_incorrect_selected)
            .with_metadata("perfectScore", perfect)
            .with_metadata("lossPerMistake", loss_per_mistake)
            .with_metadata("invalidSelections", json!(invalid_selected))
            .clamped(question.total_points))
    }
}
