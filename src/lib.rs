//! # Grading Orchestrator
//!
//! 一个按作答形态分派评分策略、并以任务形式批改整份作答的 Rust 评分引擎
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与业务无关的并发原语
//! - `KeyedMutex` - 同一键的写入串行，不同键完全并发
//!
//! ### ② 外部协作方（Clients）
//! - `clients/` - 存储、评判、内容提取、本地化、链接抓取的 trait 与实现
//!
//! ### ③ 业务能力层（Services / Strategies）
//! - `strategies/` - 每种作答形态一个评分策略，注册表按 (题型, 作答类型) 分派
//! - `services/` - 一致性检查、审计记录、作答归一化与相似度
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一道题的作答"的完整评分流程
//! - `ResponseCtx` - 上下文封装（作业 + 作答 + 同一提交中的其它作答）
//! - `ResponseFlow` - 流程编排（取题 → 策略评分 → 一致性 → 写库 → 审计）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/submission_processor` - 整份提交的并发评分
//! - `orchestrator/job_manager` - 评分任务状态机
//! - `orchestrator/status_stream` - 任务状态推送
//! - `orchestrator/app` - 应用入口
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod strategies;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, GradingError, JobError, SubmissionError};
pub use models::{GradingResult, Question, QuestionResponseInput, SubmissionRequest};
pub use orchestrator::{App, GradingJobManager, JobStatusStream, SubmissionProcessor};
pub use workflow::{ResponseCtx, ResponseFlow};
