//! 评分策略 - 业务能力层
//!
//! 每种作答形态一个策略，统一实现 `validate → extract → grade` 三步。
//! 选择题 / 判断题在本地计分，其余形态交给外部评判服务，
//! 评判之后的细则校验、分数修正、反馈补充由本层负责。
//!
//! 策略不持有可变状态，可以被多个并发评分共享。

pub mod choice;
pub mod file;
pub mod image;
pub mod presentation;
pub mod registry;
pub mod text;
pub mod true_false;
pub mod url;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::clients::{ContentExtractor, JudgmentResponse, JudgmentService, Localizer, UrlFetcher};
use crate::error::GradingError;
use crate::models::{Feedback, GradingContext, GradingResult, Question, QuestionResponseInput, TypedResponse};
use crate::services::validate_rubric_scores;

pub use choice::{MultipleChoiceStrategy, SingleChoiceStrategy};
pub use file::FileStrategy;
pub use image::ImageStrategy;
pub use presentation::PresentationStrategy;
pub use registry::StrategyRegistry;
pub use text::TextStrategy;
pub use true_false::{resolve_boolean, TrueFalseStrategy};
pub use url::{UrlStrategy, FAILED_URL_STRATEGY_NAME};

/// 结果元数据中覆盖审计策略名的键
pub const AUDIT_STRATEGY_KEY: &str = "auditStrategyName";

/// 评分策略
#[async_trait]
pub trait GradingStrategy: Send + Sync {
    /// 策略名，写入审计记录
    fn name(&self) -> &'static str;

    /// 校验作答形状，失败时返回已本地化的消息
    fn validate(&self, question: &Question, input: &QuestionResponseInput) -> Result<(), GradingError>;

    /// 提取规范化载荷
    fn extract(&self, input: &QuestionResponseInput) -> Result<TypedResponse, GradingError>;

    /// 计分；返回前分数已限制在 `[0, question.total_points]`
    async fn grade(
        &self,
        question: &Question,
        response: &TypedResponse,
        context: &GradingContext,
    ) -> Result<GradingResult, GradingError>;
}

/// 策略共享的外部协作方
#[derive(Clone)]
pub struct StrategyDeps {
    pub judgment: Arc<dyn JudgmentService>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub fetcher: Arc<dyn UrlFetcher>,
    pub localizer: Arc<dyn Localizer>,
}

/// 载荷类型与策略不符
pub(crate) fn unexpected_payload(strategy: &str, question: &Question, response: &TypedResponse) -> GradingError {
    GradingError::internal(
        question.id,
        format!("{} 收到了不支持的载荷类型 {}", strategy, response.kind()),
    )
}

/// 分数的展示形式：整数不带小数
pub(crate) fn format_points(points: f64) -> String {
    if (points - points.round()).abs() < 1e-9 {
        format!("{}", points.round() as i64)
    } else {
        format!("{:.2}", points)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// 把评判结果转为评分结果
///
/// 有细则且评判给出细则得分时，先校验（非法分值吸附到最近档位），
/// 数量一致则以校验后的细则总分为准；最后限制到满分
pub(crate) fn result_from_judgment(
    question: &Question,
    judgment: JudgmentResponse,
    strategy_name: &str,
) -> GradingResult {
    let mut points = judgment.points;
    let mut result_metadata = serde_json::Map::new();

    let rubrics = question.rubrics();
    if let Some(scores) = judgment.rubric_scores.as_ref().filter(|_| !rubrics.is_empty()) {
        let validation = validate_rubric_scores(rubrics, scores);
        if validation.count_matches {
            points = validation.corrected_total();
        }
        result_metadata.insert(
            "rubricScores".to_string(),
            serde_json::to_value(&validation.corrected).unwrap_or_default(),
        );
        result_metadata.insert("rubricValid".to_string(), json!(validation.valid));
        if !validation.issues.is_empty() {
            result_metadata.insert("rubricIssues".to_string(), json!(validation.issues));
        }
    }

    if let Some(rationale) = judgment.rationale {
        result_metadata.insert("rationale".to_string(), json!(rationale));
    }
    result_metadata.insert("strategy".to_string(), json!(strategy_name));

    let mut result = GradingResult::new(points, vec![Feedback::new(judgment.feedback)]);
    result.metadata = result_metadata;
    result.clamped(question.total_points)
}
