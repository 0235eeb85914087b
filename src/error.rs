use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 单题评分错误
    #[error("评分错误: {0}")]
    Grading(#[from] GradingError),
    /// 整份提交评分失败
    #[error("提交错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 评分任务错误
    #[error("任务错误: {0}")]
    Job(#[from] JobError),
    /// 存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 单题评分错误
///
/// 校验 / 提取错误携带已本地化的消息，直接返回给调用方，不重试。
#[derive(Debug, Error)]
pub enum GradingError {
    /// 作答形状不合法
    #[error("{message}")]
    Validation { message: String },
    /// 无法从作答中提取规范化载荷
    #[error("{message}")]
    Extraction { message: String },
    /// 没有对应的评分策略
    #[error("没有可用的评分策略: 题型 {question_type}, 作答类型 {response_type}")]
    NoStrategy {
        question_type: String,
        response_type: String,
    },
    /// 找不到题目
    #[error("找不到题目 {question_id}")]
    QuestionNotFound { question_id: i64 },
    /// 评判服务失败
    #[error("评判服务调用失败 (题目 {question_id}): {source}")]
    Judgment {
        question_id: i64,
        #[source]
        source: anyhow::Error,
    },
    /// 策略内部错误
    #[error("评分失败 (题目 {question_id}): {message}")]
    Internal { question_id: i64, message: String },
    /// 持久化作答失败
    #[error("保存作答失败 (题目 {question_id}): {source}")]
    Persist {
        question_id: i64,
        #[source]
        source: StoreError,
    },
}

impl GradingError {
    /// 创建校验错误
    pub fn validation(message: impl Into<String>) -> Self {
        GradingError::Validation {
            message: message.into(),
        }
    }

    /// 创建提取错误
    pub fn extraction(message: impl Into<String>) -> Self {
        GradingError::Extraction {
            message: message.into(),
        }
    }

    /// 创建评判服务错误
    pub fn judgment(question_id: i64, source: impl Into<anyhow::Error>) -> Self {
        GradingError::Judgment {
            question_id,
            source: source.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(question_id: i64, message: impl Into<String>) -> Self {
        GradingError::Internal {
            question_id,
            message: message.into(),
        }
    }

    /// 是否是调用方输入导致的错误
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GradingError::Validation { .. }
                | GradingError::Extraction { .. }
                | GradingError::QuestionNotFound { .. }
        )
    }
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 记录不存在
    #[error("记录不存在: {entity} {id}")]
    NotFound { entity: &'static str, id: String },
    /// 终态任务不可修改
    #[error("任务 {job_id} 已处于终态 {status}，拒绝修改")]
    TerminalJob { job_id: String, status: String },
    /// 底层存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 整份提交评分失败
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// 至少一道题失败
    #[error("{} 道题评分失败 (成功 {succeeded} 道): {}", .failures.len(), summarize(.failures))]
    PartialFailure {
        failures: Vec<(i64, GradingError)>,
        succeeded: usize,
    },
    /// 提交中没有作答
    #[error("提交中没有任何作答")]
    EmptySubmission,
}

fn summarize(failures: &[(i64, GradingError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("[题目 {}] {}", id, e))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 评分任务错误
#[derive(Debug, Error)]
pub enum JobError {
    /// 任务不存在
    #[error("任务不存在: {0}")]
    NotFound(String),
    /// 非法状态转移
    #[error("任务 {job_id} 不允许从 {from} 转移到 {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },
    /// 存储错误
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 存储结果类型
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_message_lists_every_question() {
        let err = SubmissionError::PartialFailure {
            failures: vec![
                (1, GradingError::validation("empty url")),
                (
                    3,
                    GradingError::NoStrategy {
                        question_type: "TEXT".into(),
                        response_type: "IMAGES".into(),
                    },
                ),
            ],
            succeeded: 2,
        };
        let message = err.to_string();
        assert!(message.contains("2 道题评分失败"));
        assert!(message.contains("[题目 1] empty url"));
        assert!(message.contains("[题目 3]"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(GradingError::validation("x").is_client_error());
        assert!(!GradingError::internal(1, "boom").is_client_error());
        assert!(!GradingError::judgment(1, anyhow::anyhow!("down")).is_client_error());
    }
}
