pub mod audit;
pub mod grading;
pub mod job;
pub mod loaders;
pub mod question;
pub mod response;
pub mod submission;

pub use audit::{
    AuditFilter, AuditGroupField, GradingAuditEntry, GradingIssue, GradingIssueKind,
    GradingStatistics, GradingUsageStatistics,
};
pub use grading::{
    clamp_points, Feedback, GradingContext, GradingResult, QuestionAnswerContext, RubricScore,
    UserRole,
};
pub use job::{
    GradingJob, JobEventData, JobEventType, JobStatus, JobStatusEvent, JobUpdate, NewGradingJob,
};
pub use loaders::{load_all_submissions, load_toml_to_submission, SubmissionFile};
pub use question::{
    Choice, Question, QuestionType, ResponseType, Rubric, RubricCriterion, Scoring, ScoringType,
};
pub use response::{
    BooleanAnswer, FileRef, ImageRef, PresentationRef, QuestionResponseInput, TypedResponse,
};
pub use submission::{
    QuestionOutcome, QuestionResponseRecord, SubmissionGradingResult, SubmissionRequest,
};
