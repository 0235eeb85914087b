//! 策略注册表
//!
//! `(题型, 作答类型)` → 策略。查找时先按精确作答类型，再按该题型的通配项（`None`）；
//! 都没有时报 `NoStrategy`，不会静默回退到其它策略。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::GradingError;
use crate::models::{QuestionType, ResponseType};
use crate::strategies::{
    FileStrategy, GradingStrategy, ImageStrategy, MultipleChoiceStrategy, PresentationStrategy,
    SingleChoiceStrategy, StrategyDeps, TextStrategy, TrueFalseStrategy, UrlStrategy,
};

type StrategyKey = (QuestionType, Option<ResponseType>);

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKey, Arc<dyn GradingStrategy>>,
}

impl StrategyRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置策略
    ///
    /// 上传 / 外链文件题按作答类型分流：图片 → 图片策略，演示 / 录制 → 演示策略，其余 → 文件策略
    pub fn with_defaults(deps: &StrategyDeps) -> Self {
        let text: Arc<dyn GradingStrategy> =
            Arc::new(TextStrategy::new(deps.judgment.clone(), deps.localizer.clone()));
        let single: Arc<dyn GradingStrategy> =
            Arc::new(SingleChoiceStrategy::new(deps.localizer.clone()));
        let multiple: Arc<dyn GradingStrategy> =
            Arc::new(MultipleChoiceStrategy::new(deps.localizer.clone()));
        let true_false: Arc<dyn GradingStrategy> =
            Arc::new(TrueFalseStrategy::new(deps.localizer.clone()));
        let url: Arc<dyn GradingStrategy> = Arc::new(UrlStrategy::new(
            deps.judgment.clone(),
            deps.fetcher.clone(),
            deps.localizer.clone(),
        ));
        let file: Arc<dyn GradingStrategy> = Arc::new(FileStrategy::new(
            deps.judgment.clone(),
            deps.extractor.clone(),
            deps.localizer.clone(),
        ));
        let image: Arc<dyn GradingStrategy> =
            Arc::new(ImageStrategy::new(deps.judgment.clone(), deps.localizer.clone()));
        let presentation: Arc<dyn GradingStrategy> = Arc::new(PresentationStrategy::new(
            deps.judgment.clone(),
            deps.localizer.clone(),
        ));

        let mut registry = Self::new();
        registry.register(QuestionType::Text, None, text);
        registry.register(QuestionType::SingleCorrect, None, single);
        registry.register(QuestionType::MultipleCorrect, None, multiple);
        registry.register(QuestionType::TrueFalse, None, true_false);
        registry.register(QuestionType::Url, None, url);

        for question_type in [QuestionType::Upload, QuestionType::LinkFile] {
            registry.register(question_type, None, file.clone());
            registry.register(question_type, Some(ResponseType::Images), image.clone());
            registry.register(question_type, Some(ResponseType::Presentation), presentation.clone());
            registry.register(question_type, Some(ResponseType::LiveRecording), presentation.clone());
        }

        registry
    }

    /// 注册策略；`response_type` 为 `None` 表示该题型的通配项
    pub fn register(
        &mut self,
        question_type: QuestionType,
        response_type: Option<ResponseType>,
        strategy: Arc<dyn GradingStrategy>,
    ) {
        self.strategies.insert((question_type, response_type), strategy);
    }

    pub fn resolve(
        &self,
        question_type: QuestionType,
        response_type: Option<ResponseType>,
    ) -> Result<Arc<dyn GradingStrategy>, GradingError> {
        let exact = response_type.and_then(|rt| self.strategies.get(&(question_type, Some(rt))));
        let found = exact.or_else(|| self.strategies.get(&(question_type, None)));

        match found {
            Some(strategy) => {
                debug!(
                    "题型 {} / 作答类型 {:?} → {}",
                    question_type,
                    response_type,
                    strategy.name()
                );
                Ok(strategy.clone())
            }
            None => Err(GradingError::NoStrategy {
                question_type: question_type.to_string(),
                response_type: response_type
                    .map(|rt| rt.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::{deps, FixedJudgment};

    fn registry() -> StrategyRegistry {
        StrategyRegistry::with_defaults(&deps(Arc::new(FixedJudgment::new(0.0, ""))))
    }

    #[test]
    fn test_upload_routes_by_response_type() {
        let registry = registry();
        let name = |qt, rt| registry.resolve(qt, rt).unwrap().name();

        assert_eq!(name(QuestionType::Upload, Some(ResponseType::Images)), "ImageStrategy");
        assert_eq!(
            name(QuestionType::LinkFile, Some(ResponseType::LiveRecording)),
            "PresentationStrategy"
        );
        assert_eq!(name(QuestionType::Upload, Some(ResponseType::Code)), "FileStrategy");
        assert_eq!(name(QuestionType::Upload, None), "FileStrategy");
        assert_eq!(name(QuestionType::Text, Some(ResponseType::Essay)), "TextStrategy");
        assert_eq!(name(QuestionType::TrueFalse, None), "TrueFalseStrategy");
        assert_eq!(name(QuestionType::Url, Some(ResponseType::Repo)), "UrlStrategy");
    }

    #[test]
    fn test_unregistered_combination_fails() {
        let mut registry = StrategyRegistry::new();
        let deps = deps(Arc::new(FixedJudgment::new(0.0, "")));
        registry.register(
            QuestionType::Upload,
            Some(ResponseType::Images),
            Arc::new(ImageStrategy::new(deps.judgment, deps.localizer)),
        );

        let err = registry
            .resolve(QuestionType::Upload, Some(ResponseType::Code))
            .err()
            .unwrap();
        assert!(matches!(err, GradingError::NoStrategy { .. }));
        assert!(err.to_string().contains("UPLOAD"));
        assert!(registry.resolve(QuestionType::Text, None).is_err());
    }
}
