//! 业务能力层
//!
//! 描述"我能做什么"：一致性检查、审计记录、作答归一化与相似度。
//! 不关心单题流程顺序，也不关心整份提交。

pub mod audit;
pub mod consistency;
pub mod normalization;
pub mod similarity;

pub use audit::AuditRecorder;
pub use consistency::{
    validate_rubric_scores, CacheStats, ConsistencyCheck, ConsistencyService, ConsistencySource,
    CorrectionSuggestion, GradingRecord, RubricValidation, SweepReport,
};
pub use normalization::{normalize_response, response_hash};
pub use similarity::{jaccard_similarity, levenshtein_ratio, response_similarity, similar_response_score};
