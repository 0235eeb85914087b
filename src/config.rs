use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// 一致性检查配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// 每道题最多缓存的评分记录数
    pub max_records_per_question: usize,
    /// 缓存中最多保留的题目键数
    pub max_cached_questions: usize,
    /// 缓存记录存活时间（秒）
    pub record_ttl_secs: u64,
    /// 定期清理间隔（秒）
    pub sweep_interval_secs: u64,
    /// 查询审计记录的回看天数
    pub lookback_days: i64,
    /// 每次查询审计记录的条数上限
    pub audit_sample_size: usize,
    /// 分差超过满分的该百分比时给出修正建议
    pub deviation_threshold_percent: f64,
    /// 相似度阈值
    pub similarity_threshold: f64,
    /// 超过该长度的文本改用 Jaccard 相似度
    pub long_text_threshold: usize,
    /// 是否直接应用修正建议
    pub apply_corrections: bool,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            max_records_per_question: 100,
            max_cached_questions: 1000,
            record_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            lookback_days: 7,
            audit_sample_size: 50,
            deviation_threshold_percent: 15.0,
            similarity_threshold: 0.85,
            long_text_threshold: 500,
            apply_corrections: false,
        }
    }
}

impl ConsistencyConfig {
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 状态流配置（毫秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub heartbeat_interval_ms: u64,
    /// 距上次真实更新超过该时间才发心跳
    pub heartbeat_idle_ms: u64,
    pub initial_poll_ms: u64,
    pub min_poll_ms: u64,
    pub max_poll_ms: u64,
    pub max_consecutive_errors: u32,
    /// 轮询发现终态后，关闭前的等待时间
    pub finalize_grace_ms: u64,
    /// 推送终态后，关闭前的等待时间
    pub terminal_cleanup_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            heartbeat_idle_ms: 15_000,
            initial_poll_ms: 2_000,
            min_poll_ms: 2_000,
            max_poll_ms: 15_000,
            max_consecutive_errors: 10,
            finalize_grace_ms: 500,
            terminal_cleanup_ms: 1_000,
            channel_capacity: 64,
        }
    }
}

impl StreamConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_idle(&self) -> Duration {
        Duration::from_millis(self.heartbeat_idle_ms)
    }

    pub fn finalize_grace(&self) -> Duration {
        Duration::from_millis(self.finalize_grace_ms)
    }

    pub fn terminal_cleanup(&self) -> Duration {
        Duration::from_millis(self.terminal_cleanup_ms)
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同一份提交中同时评分的题目数量
    pub max_concurrent_responses: usize,
    /// 同时运行的评分任务数量
    pub max_concurrent_jobs: usize,
    /// 待评分提交（TOML）存放目录
    pub submission_folder: String,
    /// 文件作答所在目录（本地提取服务使用）
    pub upload_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_retries: usize,
    // --- 抓取配置 ---
    pub github_token: Option<String>,
    pub http_timeout_secs: u64,
    // --- 子模块配置 ---
    pub consistency: ConsistencyConfig,
    pub stream: StreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_responses: 8,
            max_concurrent_jobs: 4,
            submission_folder: "submissions".to_string(),
            upload_folder: "uploads".to_string(),
            verbose_logging: false,
            output_log_file: "grading.log".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
            llm_max_retries: 3,
            github_token: None,
            http_timeout_secs: 20,
            consistency: ConsistencyConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，缺失字段使用默认值，随后应用环境变量覆盖
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            max_concurrent_responses: env_parse("MAX_CONCURRENT_RESPONSES").unwrap_or(default.max_concurrent_responses),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(default.max_concurrent_jobs),
            submission_folder: std::env::var("SUBMISSION_FOLDER").unwrap_or(default.submission_folder),
            upload_folder: std::env::var("UPLOAD_FOLDER").unwrap_or(default.upload_folder),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.llm_temperature),
            llm_max_retries: env_parse("LLM_MAX_RETRIES").unwrap_or(default.llm_max_retries),
            github_token: std::env::var("GITHUB_TOKEN").ok().or(default.github_token),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS").unwrap_or(default.http_timeout_secs),
            consistency: ConsistencyConfig {
                apply_corrections: env_parse("APPLY_CONSISTENCY_CORRECTIONS")
                    .unwrap_or(default.consistency.apply_corrections),
                ..default.consistency
            },
            stream: default.stream,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
