//! 外部协作方
//!
//! 存储、评判、内容提取、本地化、链接抓取都通过这里的 trait 访问，
//! 每个 trait 附带一个可直接使用的实现。

pub mod extraction;
pub mod judgment;
pub mod llm_client;
pub mod localization;
pub mod store;
pub mod url_fetcher;

pub use extraction::{
    ContentExtractor, ExtractedContent, ExtractionMetadata, ExtractionStatus, LocalFileExtractor,
};
pub use judgment::{
    FileEvaluation, ImageEvaluation, JudgmentResponse, JudgmentService, PresentationEvaluation,
    TextEvaluation, UrlEvaluation,
};
pub use llm_client::LlmJudgmentClient;
pub use localization::{Localizer, StaticLocalizer};
pub use store::{DataStore, InMemoryStore};
pub use url_fetcher::{FetchSource, FetchedContent, HttpUrlFetcher, UrlFetcher};
