//! 文件内容提取服务
//!
//! 多格式提取子系统是外部黑盒，产出规范化文本与元数据。
//! `LocalFileExtractor` 从本地目录读取文本类文件，供运行器与测试使用。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::models::FileRef;

/// 提取状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionStatus {
    Success,
    Unsupported,
    NotFound,
    Failed,
}

/// 提取元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub size: u64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_count: Option<u32>,
    pub status: ExtractionStatus,
}

/// 单个文件的提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub filename: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    pub metadata: ExtractionMetadata,
}

impl ExtractedContent {
    pub fn is_success(&self) -> bool {
        self.metadata.status == ExtractionStatus::Success
    }
}

/// 外部提取服务
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract_content_from_files(
        &self,
        files: &[FileRef],
    ) -> anyhow::Result<Vec<ExtractedContent>>;
}

/// 摘要最多保留的字符数
const SUMMARY_CHARS: usize = 500;

/// 可按文本读取的扩展名
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rs", "py", "js", "ts", "java", "c", "cpp", "h", "go", "rb", "json", "toml",
    "yaml", "yml", "csv", "html", "css", "sql", "sh", "ipynb", "xml",
];

/// 本地文件提取
pub struct LocalFileExtractor {
    base_dir: PathBuf,
}

impl LocalFileExtractor {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    async fn extract_one(&self, file: &FileRef) -> ExtractedContent {
        let relative = file.key.clone().unwrap_or_else(|| file.filename.clone());
        let path = self.base_dir.join(&relative);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let mime_type = file
            .mime_type
            .clone()
            .unwrap_or_else(|| guess_mime(&extension).to_string());

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("读取上传文件失败 {}: {}", path.display(), e);
                return empty_result(file, mime_type, ExtractionStatus::NotFound);
            }
        };

        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            debug!("不支持的文件类型: {}", file.filename);
            let mut result = empty_result(file, mime_type, ExtractionStatus::Unsupported);
            result.metadata.size = bytes.len() as u64;
            return result;
        }

        match String::from_utf8(bytes) {
            Ok(content) => {
                let size = content.len() as u64;
                let summary: String = content.chars().take(SUMMARY_CHARS).collect();
                ExtractedContent {
                    filename: file.filename.clone(),
                    extracted_text: Some(summary),
                    content,
                    metadata: ExtractionMetadata {
                        size,
                        mime_type,
                        page_count: None,
                        slide_count: None,
                        status: ExtractionStatus::Success,
                    },
                }
            }
            Err(_) => empty_result(file, mime_type, ExtractionStatus::Failed),
        }
    }
}

#[async_trait]
impl ContentExtractor for LocalFileExtractor {
    async fn extract_content_from_files(
        &self,
        files: &[FileRef],
    ) -> anyhow::Result<Vec<ExtractedContent>> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.extract_one(file).await);
        }
        Ok(results)
    }
}

fn empty_result(file: &FileRef, mime_type: String, status: ExtractionStatus) -> ExtractedContent {
    ExtractedContent {
        filename: file.filename.clone(),
        content: String::new(),
        extracted_text: None,
        metadata: ExtractionMetadata {
            size: file.size.unwrap_or(0),
            mime_type,
            page_count: None,
            slide_count: None,
            status,
        },
    }
}

fn guess_mime(extension: &str) -> &'static str {
    match extension {
        "md" => "text/markdown",
        "json" | "ipynb" => "application/json",
        "html" => "text/html",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "" => "application/octet-stream",
        _ => "text/plain",
    }
}
