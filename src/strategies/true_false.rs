//! 判断题策略
//!
//! 作答可以是布尔值，也可以是字符串。字符串先查英文词表，再查作答语言的词表。

use async_trait::async_trait;
use phf::phf_map;
use std::sync::Arc;

use crate::clients::Localizer;
use crate::error::GradingError;
use crate::models::{
    BooleanAnswer, Feedback, GradingContext, GradingResult, Question, QuestionResponseInput,
    TypedResponse,
};
use crate::strategies::{unexpected_payload, GradingStrategy};

type Lexicon = &'static [(&'static str, bool)];

const ENGLISH: Lexicon = &[
    ("true", true),
    ("false", false),
    ("yes", true),
    ("no", false),
    ("t", true),
    ("f", false),
    ("y", true),
    ("n", false),
    ("1", true),
    ("0", false),
];

/// 各语言的真 / 假词表（键为语言主标签）
static LEXICONS: phf::Map<&'static str, Lexicon> = phf_map! {
    "fr" => &[("vrai", true), ("faux", false), ("oui", true), ("non", false), ("v", true)],
    "es" => &[("verdadero", true), ("falso", false), ("sí", true), ("si", true), ("no", false), ("v", true)],
    "pt" => &[("verdadeiro", true), ("falso", false), ("sim", true), ("não", false), ("nao", false), ("v", true)],
    "it" => &[("vero", true), ("falso", false), ("sì", true), ("si", true), ("no", false), ("v", true)],
    "de" => &[("wahr", true), ("falsch", false), ("ja", true), ("nein", false), ("w", true)],
    "nl" => &[("waar", true), ("onwaar", false), ("ja", true), ("nee", false), ("w", true), ("o", false)],
    "tr" => &[("doğru", true), ("dogru", true), ("yanlış", false), ("yanlis", false), ("evet", true), ("hayır", false), ("hayir", false), ("d", true)],
    "pl" => &[("prawda", true), ("fałsz", false), ("falsz", false), ("tak", true), ("nie", false), ("p", true)],
    "ru" => &[("правда", true), ("верно", true), ("ложь", false), ("неверно", false), ("да", true), ("нет", false)],
    "uk" => &[("правда", true), ("так", true), ("неправда", false), ("ні", false)],
    "ar" => &[("صحيح", true), ("خطأ", false), ("نعم", true), ("لا", false)],
    "he" => &[("נכון", true), ("לא נכון", false), ("כן", true), ("לא", false)],
    "zh" => &[("对", true), ("錯", false), ("错", false), ("對", true), ("是", true), ("否", false), ("正确", true), ("错误", false), ("真", true), ("假", false)],
    "ja" => &[("はい", true), ("いいえ", false), ("正しい", true), ("誤り", false), ("真", true), ("偽", false)],
    "ko" => &[("참", true), ("거짓", false), ("예", true), ("아니오", false), ("네", true), ("아니요", false)],
    "hi" => &[("सही", true), ("गलत", false), ("हाँ", true), ("हां", true), ("नहीं", false)],
    "id" => &[("benar", true), ("salah", false), ("ya", true), ("tidak", false), ("b", true), ("s", false)],
    "vi" => &[("đúng", true), ("sai", false), ("có", true), ("không", false)],
    "sv" => &[("sant", true), ("falskt", false), ("ja", true), ("nej", false)],
    "el" => &[("σωστό", true), ("λάθος", false), ("ναι", true), ("όχι", false)],
    "kk" => &[("дұрыс", true), ("қате", false), ("иә", true), ("жоқ", false)],
};

/// 把字符串作答解析为布尔值，无法识别时返回 None
pub fn resolve_boolean(answer: &str, language: &str) -> Option<bool> {
    let normalized = answer.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    if let Some((_, value)) = ENGLISH.iter().find(|(word, _)| *word == normalized) {
        return Some(*value);
    }

    let primary = language
        .split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    LEXICONS
        .get(primary.as_str())
        .and_then(|lexicon| lexicon.iter().find(|(word, _)| *word == normalized))
        .map(|(_, value)| *value)
}

/// 判断题
pub struct TrueFalseStrategy {
    localizer: Arc<dyn Localizer>,
}

impl TrueFalseStrategy {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self { localizer }
    }

    fn resolve_input(&self, input: &QuestionResponseInput) -> Result<bool, GradingError> {
        match &input.learner_answer_choice {
            None => Err(GradingError::validation(self.localizer.get_localized_string(
                "missingTrueFalse",
                &input.language,
                &[],
            ))),
            Some(BooleanAnswer::Bool(value)) => Ok(*value),
            Some(BooleanAnswer::Text(text)) => resolve_boolean(text, &input.language).ok_or_else(|| {
                GradingError::validation(self.localizer.get_localized_string(
                    "invalidTrueFalse",
                    &input.language,
                    &[("answer", text.clone())],
                ))
            }),
        }
    }
}

#[async_trait]
impl GradingStrategy for TrueFalseStrategy {
    fn name(&self) -> &'static str {
        "TrueFalseStrategy"
    }

    fn validate(&self, _question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        self.resolve_input(input).map(|_| ())
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        self.resolve_input(input).map(TypedResponse::Boolean)
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Boolean(answer) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };

        // 正确选项文本为 "true" 时答案为真
        let expected = question
            .choices
            .iter()
            .find(|c| c.is_correct)
            .map(|c| c.choice.trim().to_lowercase() == "true")
            .ok_or_else(|| GradingError::internal(question.id, "判断题没有标记正确选项"))?;

        let correct = *answer == expected;
        let key = if correct {
            "trueFalseCorrect"
        } else {
            "trueFalseIncorrect"
        };
        let feedback = self.localizer.get_localized_string(
            key,
            &context.language,
            &[("answer", expected.to_string())],
        );

        let points = if correct { question.total_points } else { 0.0 };
        Ok(GradingResult::new(points, vec![Feedback::new(feedback)])
            .with_metadata("learnerAnswer", *answer)
            .with_metadata("correctAnswer", expected)
            .clamped(question.total_points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::StaticLocalizer;
    use crate::models::{Choice, QuestionType};
    use crate::strategies::test_support::{context, question};

    fn strategy() -> TrueFalseStrategy {
        TrueFalseStrategy::new(Arc::new(StaticLocalizer::new()))
    }

    fn tf_question(correct: &str) -> Question {
        let mut q = question(1, QuestionType::TrueFalse, 2.0);
        q.choices = vec![Choice {
            choice: correct.to_string(),
            points: 2.0,
            is_correct: true,
            feedback: None,
        }];
        q
    }

    #[test]
    fn test_turkish_evet_resolves_true() {
        assert_eq!(resolve_boolean("evet", "tr"), Some(true));
        assert_eq!(resolve_boolean(" Hayır ", "tr"), Some(false));
        assert_eq!(resolve_boolean("Oui", "fr-CA"), Some(true));
        assert_eq!(resolve_boolean("Y", "de"), Some(true));
        assert_eq!(resolve_boolean("evet", "en"), None);
        assert_eq!(resolve_boolean("maybe", "fr"), None);
    }

    #[tokio::test]
    async fn test_grades_localized_answer() {
        let mut input = QuestionResponseInput::new(1);
        input.learner_answer_choice = Some(BooleanAnswer::Text("evet".into()));
        input.language = "tr".into();

        let strategy = strategy();
        let q = tf_question(" True ");
        strategy.validate(&q, &input).unwrap();
        let response = strategy.extract(&input).unwrap();
        assert_eq!(response, TypedResponse::Boolean(true));

        let result = strategy.grade(&q, &response, &context()).await.unwrap();
        assert_eq!(result.total_points, 2.0);

        let result = strategy
            .grade(&tf_question("false"), &response, &context())
            .await
            .unwrap();
        assert_eq!(result.total_points, 0.0);
    }

    #[test]
    fn test_unresolvable_answer_fails_validation() {
        let mut input = QuestionResponseInput::new(1);
        input.learner_answer_choice = Some(BooleanAnswer::Text("perhaps".into()));
        let err = strategy().validate(&tf_question("true"), &input).unwrap_err();
        assert!(matches!(err, GradingError::Validation { .. }));
        assert!(err.to_string().contains("perhaps"));

        let err = strategy()
            .validate(&tf_question("true"), &QuestionResponseInput::new(1))
            .unwrap_err();
        assert!(matches!(err, GradingError::Validation { .. }));
    }
}
