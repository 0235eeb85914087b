//! 作答处理流程 - 流程层
//!
//! 核心职责：定义"一道题的作答"的完整评分流程
//!
//! 流程顺序：
//! 1. 取题目（学习者读作答下的题目，作者预览用调用方提供的题目）
//! 2. 空作答 → 直接 0 分
//! 3. 选策略 → validate → extract → grade
//! 4. 一致性比对（尽力而为）
//! 5. 保存作答与得分（作者预览跳过）
//! 6. 写审计、写一致性缓存

use chrono::Utc;
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{DataStore, Localizer};
use crate::error::GradingError;
use crate::models::{
    Feedback, GradingContext, GradingResult, Question, QuestionAnswerContext, QuestionOutcome,
    QuestionResponseInput, QuestionResponseRecord, RubricScore, TypedResponse,
};
use crate::services::{AuditRecorder, ConsistencyService, GradingRecord};
use crate::strategies::{StrategyRegistry, AUDIT_STRATEGY_KEY};
use crate::utils::logging::truncate_text;
use crate::workflow::response_ctx::ResponseCtx;

/// 作答处理流程
///
/// - 编排一道题从取题到审计的完整流程
/// - 决定何时短路、何时写库
/// - 不关心整份提交的并发与任务状态
pub struct ResponseFlow {
    registry: Arc<StrategyRegistry>,
    store: Arc<dyn DataStore>,
    consistency: Arc<ConsistencyService>,
    audit: Arc<AuditRecorder>,
    localizer: Arc<dyn Localizer>,
    verbose_logging: bool,
}

impl ResponseFlow {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        store: Arc<dyn DataStore>,
        consistency: Arc<ConsistencyService>,
        audit: Arc<AuditRecorder>,
        localizer: Arc<dyn Localizer>,
        verbose_logging: bool,
    ) -> Self {
        Self {
            registry,
            store,
            consistency,
            audit,
            localizer,
            verbose_logging,
        }
    }

    pub async fn run(
        &self,
        input: &QuestionResponseInput,
        ctx: &ResponseCtx,
    ) -> Result<QuestionOutcome, GradingError> {
        let input = with_language(input, ctx);
        let question = self.resolve_question(&input, ctx).await?;

        if self.verbose_logging {
            info!(
                "{} 题目 {} ({}) 作答: {}",
                ctx,
                question.id,
                question.question_type,
                truncate_text(&input.as_comparable_text(), 60)
            );
        }

        // ========== 空作答：不经过策略 ==========
        if input.is_empty() {
            info!("{} 题目 {} 未作答，记 0 分", ctx, question.id);
            let feedback = self
                .localizer
                .get_localized_string("noResponse", &input.language, &[]);
            let result = GradingResult::zero(feedback).with_metadata("noResponse", true);
            self.persist(&input, &result, ctx).await?;
            return Ok(outcome(&question, result));
        }

        // ========== 策略评分 ==========
        let strategy = self
            .registry
            .resolve(question.question_type, question.response_type)?;
        strategy.validate(&question, &input)?;
        let typed = strategy.extract(&input)?;

        let context = self.build_context(&question, &input, ctx).await;
        let graded = strategy.grade(&question, &typed, &context).await?;
        let graded = graded.clamped(question.total_points);

        // ========== 一致性比对 ==========
        let raw = comparable_text(&input, &typed);
        let hash = self.consistency.hash(question.id, &raw, question.question_type);
        let result = self.apply_consistency(&question, &hash, &raw, graded).await;

        info!(
            "{} ✓ 题目 {} 得分 {}/{} ({})",
            ctx,
            question.id,
            result.total_points,
            question.total_points,
            strategy.name()
        );

        // ========== 写库 / 审计 / 缓存 ==========
        self.persist(&input, &result, ctx).await?;

        let strategy_name = result
            .metadata
            .get(AUDIT_STRATEGY_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| strategy.name())
            .to_string();
        let entry = AuditRecorder::build_entry(
            question.id,
            ctx.assignment_id,
            &raw,
            &result,
            question.total_points,
            &strategy_name,
            json!({
                "attemptId": ctx.attempt_id,
                "questionType": question.question_type,
                "responseHash": hash,
                "language": input.language,
                "authorPreview": ctx.is_author_preview(),
            }),
        );
        self.audit.record_grading(entry).await;

        let rubric_scores = result
            .metadata
            .get("rubricScores")
            .and_then(|v| serde_json::from_value::<Vec<RubricScore>>(v.clone()).ok());
        self.consistency
            .record_grading(GradingRecord {
                question_id: question.id,
                response_hash: hash,
                points: result.total_points,
                max_points: question.total_points,
                feedback: result.feedback_text(),
                rubric_scores,
                timestamp: Utc::now(),
            })
            .await;

        Ok(outcome(&question, result))
    }

    /// 取题目：学习者读作答下的题目（已应用变体与翻译），作者预览用调用方提供的题目
    async fn resolve_question(
        &self,
        input: &QuestionResponseInput,
        ctx: &ResponseCtx,
    ) -> Result<Question, GradingError> {
        let question_id = input.question_id;
        let attempt_id = match ctx.attempt_id {
            Some(attempt_id) if !ctx.is_author_preview() => attempt_id,
            _ => {
                return input
                    .question_override
                    .clone()
                    .ok_or(GradingError::QuestionNotFound { question_id })
            }
        };

        match self.store.find_attempt_question(attempt_id, question_id).await {
            Ok(Some(question)) => Ok(question),
            Ok(None) => Err(GradingError::QuestionNotFound { question_id }),
            Err(e) => Err(GradingError::internal(
                question_id,
                format!("读取题目失败: {}", e),
            )),
        }
    }

    /// 拼接评分上下文：本题引用的其它题目 + 学习者在同一份提交中对它们的作答
    async fn build_context(
        &self,
        question: &Question,
        input: &QuestionResponseInput,
        ctx: &ResponseCtx,
    ) -> GradingContext {
        let mut question_answer_context = Vec::new();

        for &ref_id in &question.grading_context_question_ids {
            let Some(sibling) = ctx.siblings.get(&ref_id) else {
                debug!("{} 题目 {} 引用的题目 {} 未作答", ctx, question.id, ref_id);
                continue;
            };

            let ref_question = match ctx.attempt_id {
                Some(attempt_id) if !ctx.is_author_preview() => {
                    match self.store.find_attempt_question(attempt_id, ref_id).await {
                        Ok(found) => found,
                        Err(e) => {
                            warn!("⚠️ {} 读取上下文题目 {} 失败: {}", ctx, ref_id, e);
                            None
                        }
                    }
                }
                _ => sibling.question_override.clone(),
            };

            if let Some(ref_question) = ref_question {
                question_answer_context.push(QuestionAnswerContext {
                    question: ref_question.question,
                    answer: sibling.as_comparable_text(),
                });
            }
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("attemptId".to_string(), json!(ctx.attempt_id));
        metadata.insert("questionType".to_string(), json!(question.question_type));

        GradingContext {
            assignment_instructions: ctx.instructions.clone(),
            question_answer_context,
            assignment_id: ctx.assignment_id,
            language: input.language.clone(),
            user_role: ctx.role,
            metadata,
        }
    }

    /// 与既往评分比对；出错只记 warn，不影响本次得分
    async fn apply_consistency(
        &self,
        question: &Question,
        hash: &str,
        raw: &str,
        result: GradingResult,
    ) -> GradingResult {
        let check = match self
            .consistency
            .check_consistency(question.id, hash, raw, question.question_type)
            .await
        {
            Ok(Some(check)) => check,
            Ok(None) => return result,
            Err(e) => {
                warn!("⚠️ 题目 {} 一致性检查失败，跳过: {}", question.id, e);
                return result;
            }
        };

        let mut result = result.with_metadata(
            "consistencyCheck",
            serde_json::to_value(&check).unwrap_or_default(),
        );

        let Some(suggestion) =
            self.consistency
                .evaluate(&check, result.total_points, question.total_points)
        else {
            return result;
        };

        warn!(
            "⚠️ 题目 {} 得分与相似作答偏差 {:.1}%（当前 {}，建议 {}）",
            question.id,
            suggestion.score_deviation_percentage,
            suggestion.current_points,
            suggestion.suggested_points
        );
        result = result.with_metadata(
            "consistencySuggestion",
            serde_json::to_value(&suggestion).unwrap_or_default(),
        );

        if !self.consistency.config().apply_corrections {
            return result;
        }

        let original = result.total_points;
        let mut corrected = GradingResult::new(suggestion.suggested_points, result.feedback.clone());
        if !suggestion.suggested_feedback.trim().is_empty() {
            corrected.feedback = vec![Feedback::new(suggestion.suggested_feedback)];
        }
        corrected.metadata = result.metadata;
        info!(
            "题目 {} 已按一致性建议修正: {} → {}",
            question.id, original, corrected.total_points
        );
        corrected
            .with_metadata("originalPoints", original)
            .with_metadata("correctionApplied", true)
            .clamped(question.total_points)
    }

    /// 保存作答与得分；作者预览不写库
    async fn persist(
        &self,
        input: &QuestionResponseInput,
        result: &GradingResult,
        ctx: &ResponseCtx,
    ) -> Result<(), GradingError> {
        let Some(attempt_id) = ctx.attempt_id.filter(|_| !ctx.is_author_preview()) else {
            debug!("{} 作者预览，跳过保存题目 {}", ctx, input.question_id);
            return Ok(());
        };

        let record = QuestionResponseRecord {
            attempt_id,
            question_id: input.question_id,
            response: serde_json::to_value(input).unwrap_or_default(),
            points: result.total_points,
            feedback: result.feedback.clone(),
            graded_at: Utc::now(),
        };

        self.store
            .save_question_response(record)
            .await
            .map_err(|source| GradingError::Persist {
                question_id: input.question_id,
                source,
            })
    }
}

/// 作答没写语言时沿用提交的语言
fn with_language<'a>(input: &'a QuestionResponseInput, ctx: &ResponseCtx) -> Cow<'a, QuestionResponseInput> {
    if input.language.trim().is_empty() {
        let mut owned = input.clone();
        owned.language = ctx.language_for(input).to_string();
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(input)
    }
}

/// 在结果上标注题号与题干
/// 比对用文本；判断题用解析后的布尔值，不同语言的"是 / 否"落到同一个哈希
fn comparable_text(input: &QuestionResponseInput, typed: &TypedResponse) -> String {
    match typed {
        TypedResponse::Boolean(answer) => answer.to_string(),
        _ => input.as_comparable_text(),
    }
}

fn outcome(question: &Question, result: GradingResult) -> QuestionOutcome {
    let result = result
        .with_metadata("questionId", question.id)
        .with_metadata("questionText", question.question.clone());

    QuestionOutcome {
        question_id: question.id,
        question_text: question.question.clone(),
        max_points: question.total_points,
        result,
    }
}
