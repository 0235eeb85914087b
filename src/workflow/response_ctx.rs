//! 作答处理上下文
//!
//! 封装"我正在批改哪份作答的哪一题"这一信息，以及同一份提交里的其它作答

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use crate::models::{QuestionResponseInput, SubmissionRequest, UserRole};

/// 作答处理上下文
///
/// 同一份提交内的所有题目共享 `siblings`，用于拼接评分上下文
#[derive(Debug, Clone)]
pub struct ResponseCtx {
    pub assignment_id: i64,

    /// 作者预览时为空
    pub attempt_id: Option<i64>,

    pub role: UserRole,

    /// 提交的默认语言（作答自身未指定时使用）
    pub language: String,

    pub instructions: String,

    /// 同一份提交中的全部作答，按题号索引
    pub siblings: Arc<HashMap<i64, QuestionResponseInput>>,
}

impl ResponseCtx {
    /// 由整份提交创建上下文
    pub fn from_submission(submission: &SubmissionRequest) -> Self {
        let siblings = submission
            .responses
            .iter()
            .map(|r| (r.question_id, r.clone()))
            .collect();

        Self {
            assignment_id: submission.assignment_id,
            attempt_id: submission.attempt_id,
            role: submission.role,
            language: submission.language.clone(),
            instructions: submission.instructions.clone(),
            siblings: Arc::new(siblings),
        }
    }

    /// 作者预览：没有作答记录，不写库
    pub fn is_author_preview(&self) -> bool {
        self.role == UserRole::Author || self.attempt_id.is_none()
    }

    /// 作答实际使用的语言
    pub fn language_for<'a>(&'a self, input: &'a QuestionResponseInput) -> &'a str {
        if input.language.trim().is_empty() {
            &self.language
        } else {
            &input.language
        }
    }
}

impl Display for ResponseCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.attempt_id {
            Some(attempt_id) => write!(f, "[作业 #{} 作答 #{}]", self.assignment_id, attempt_id),
            None => write!(f, "[作业 #{} 预览]", self.assignment_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(attempt_id: Option<i64>, role: UserRole) -> SubmissionRequest {
        let mut tr = QuestionResponseInput::new(2);
        tr.language = "tr".into();
        let mut inherit = QuestionResponseInput::new(1);
        inherit.language = String::new();

        SubmissionRequest {
            assignment_id: 9,
            attempt_id,
            user_id: "u-1".into(),
            role,
            language: "de".into(),
            instructions: String::new(),
            responses: vec![inherit, tr],
        }
    }

    #[test]
    fn test_language_falls_back_to_submission() {
        let sub = submission(Some(4), UserRole::Learner);
        let ctx = ResponseCtx::from_submission(&sub);
        assert_eq!(ctx.language_for(&sub.responses[0]), "de");
        assert_eq!(ctx.language_for(&sub.responses[1]), "tr");
        assert_eq!(ctx.siblings.len(), 2);
        assert_eq!(ctx.to_string(), "[作业 #9 作答 #4]");
    }

    #[test]
    fn test_author_preview_detection() {
        assert!(!ResponseCtx::from_submission(&submission(Some(4), UserRole::Learner)).is_author_preview());
        assert!(ResponseCtx::from_submission(&submission(Some(4), UserRole::Author)).is_author_preview());

        let preview = ResponseCtx::from_submission(&submission(None, UserRole::Learner));
        assert!(preview.is_author_preview());
        assert_eq!(preview.to_string(), "[作业 #9 预览]");
    }
}
