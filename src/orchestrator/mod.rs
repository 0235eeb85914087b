//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责整份提交的并发评分、任务生命周期与状态推送，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、清理）
//! - 批量加载提交（Vec<SubmissionFile>）
//! - 为每份提交创建任务并订阅状态流
//! - 输出全局统计信息
//!
//! ### `job_manager` - 评分任务管理器
//! - 任务状态机：Pending → Processing → {Completed, Failed}
//! - 同一任务的写入串行，百分比不回退
//! - 每次写入后广播给状态流
//!
//! ### `status_stream` - 任务状态推送
//! - 心跳 + 自适应轮询 + 主动推送
//! - 每个订阅只收到一次 finalize
//!
//! ### `submission_processor` - 单份提交处理器
//! - 并发处理提交中的所有作答（Semaphore）
//! - 任意一道题失败则整份提交失败
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<SubmissionFile>)
//!     ↓
//! job_manager ←→ status_stream
//!     ↓
//! submission_processor (处理 Vec<QuestionResponseInput>)
//!     ↓
//! workflow::ResponseFlow (处理单个作答)
//!     ↓
//! strategies / services (能力层：评分策略 / 一致性 / 审计)
//!     ↓
//! clients / infrastructure (外部协作方 / 按键加锁)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管批量，job_manager 管任务，submission_processor 管单份提交
//! 2. **向下依赖**：编排层 → workflow → strategies / services → clients
//! 3. **无业务逻辑**：只做调度和统计，不做具体评分判断

pub mod app;
pub mod job_manager;
pub mod status_stream;
pub mod submission_processor;

// 重新导出主要类型
pub use app::App;
pub use job_manager::GradingJobManager;
pub use status_stream::{JobStatusStream, JobSubscription};
pub use submission_processor::{ProgressCallback, SubmissionProcessor, SubmissionProgress};
