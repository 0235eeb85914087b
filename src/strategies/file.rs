//! 文件题策略
//!
//! 每个文件需要文件名，并且要么有存储键 + 桶，要么有 GitHub 链接。
//! 内容先交给提取服务，再连同题目一起交给评判服务。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::{ContentExtractor, FileEvaluation, JudgmentService, Localizer};
use crate::error::GradingError;
use crate::models::{GradingContext, GradingResult, Question, QuestionResponseInput, TypedResponse};
use crate::strategies::{result_from_judgment, unexpected_payload, GradingStrategy};

pub struct FileStrategy {
    judgment: Arc<dyn JudgmentService>,
    extractor: Arc<dyn ContentExtractor>,
    localizer: Arc<dyn Localizer>,
}

impl FileStrategy {
    pub fn new(
        judgment: Arc<dyn JudgmentService>,
        extractor: Arc<dyn ContentExtractor>,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            judgment,
            extractor,
            localizer,
        }
    }
}

#[async_trait]
impl GradingStrategy for FileStrategy {
    fn name(&self) -> &'static str {
        "FileStrategy"
    }

    fn validate(&self, _question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError> {
        let files = input.learner_file_response.as_deref().unwrap_or_default();
        if files.is_empty() {
            return Err(GradingError::validation(self.localizer.get_localized_string(
                "noFilesProvided",
                &input.language,
                &[],
            )));
        }

        for file in files {
            let located = file.has_storage_location() || file.has_github_location();
            if file.filename.trim().is_empty() || !located {
                return Err(GradingError::validation(self.localizer.get_localized_string(
                    "invalidFileReference",
                    &input.language,
                    &[("filename", file.filename.clone())],
                )));
            }
        }
        Ok(())
    }

    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError> {
        input
            .learner_file_response
            .clone()
            .map(TypedResponse::Files)
            .ok_or_else(|| GradingError::extraction("learnerFileResponse is missing"))
    }

    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError> {
        let TypedResponse::Files(files) = response else {
            return Err(unexpected_payload(self.name(), question, response));
        };

        let extracted = self
            .extractor
            .extract_content_from_files(files)
            .await
            .map_err(|e| GradingError::internal(question.id, format!("文件内容提取失败: {}", e)))?;

        let failed = extracted.iter().filter(|c| !c.is_success()).count();
        if failed > 0 {
            warn!("⚠️ 题目 {} 有 {} 个文件未能提取内容", question.id, failed);
        }
        debug!("题目 {} 提交文件评判 ({} 个文件)", question.id, extracted.len());

        let file_count = extracted.len();
        let model = FileEvaluation {
            question: question.clone(),
            files: extracted,
            context: context.clone(),
        };
        let judgment = self
            .judgment
            .grade_file_based(&model, context.assignment_id, &context.language)
            .await
            .map_err(|e| GradingError::judgment(question.id, e))?;

        Ok(result_from_judgment(question, judgment, self.name())
            .with_metadata("fileCount", file_count)
            .with_metadata("failedExtractions", failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRef, QuestionType};
    use crate::strategies::test_support::{context, deps, question, FixedJudgment};

    fn strategy(judge: Arc<FixedJudgment>) -> FileStrategy {
        let deps = deps(judge);
        FileStrategy::new(deps.judgment, deps.extractor, deps.localizer)
    }

    #[test]
    fn test_file_reference_validation() {
        let strategy = strategy(Arc::new(FixedJudgment::new(1.0, "")));
        let q = question(1, QuestionType::Upload, 5.0);
        let mut input = QuestionResponseInput::new(1);

        input.learner_file_response = Some(vec![]);
        assert!(strategy.validate(&q, &input).is_err());

        input.learner_file_response = Some(vec![FileRef {
            filename: "report.pdf".into(),
            key: Some("uploads/report.pdf".into()),
            ..Default::default()
        }]);
        let err = strategy.validate(&q, &input).unwrap_err();
        assert!(err.to_string().contains("report.pdf"));

        input.learner_file_response = Some(vec![
            FileRef {
                filename: "report.pdf".into(),
                key: Some("uploads/report.pdf".into()),
                bucket: Some("submissions".into()),
                ..Default::default()
            },
            FileRef {
                filename: "main.rs".into(),
                github_url: Some("https://github.com/acme/widgets/blob/main/src/main.rs".into()),
                ..Default::default()
            },
        ]);
        assert!(strategy.validate(&q, &input).is_ok());
    }

    #[tokio::test]
    async fn test_extracted_content_reaches_judge() {
        let judge = Arc::new(FixedJudgment::new(3.0, "Readable code"));
        let strategy = strategy(judge.clone());
        let q = question(1, QuestionType::Upload, 5.0);
        let files = vec![
            FileRef { filename: "a.rs".into(), ..Default::default() },
            FileRef { filename: "b.rs".into(), ..Default::default() },
        ];

        let result = strategy
            .grade(&q, &TypedResponse::Files(files), &context())
            .await
            .unwrap();
        assert_eq!(result.total_points, 3.0);
        assert_eq!(result.metadata["fileCount"], 2);
        assert_eq!(
            judge.seen.lock().unwrap()[0],
            "content of a.rs|content of b.rs"
        );
    }
}
