use crate::models::submission::SubmissionRequest;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::models::question::Question;

/// 提交文件：作答 + 作答对应的题目
///
/// 题目会被写入演示存储，作为学习者路径读取的"作答变体"。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFile {
    #[serde(default)]
    pub questions: Vec<Question>,
    pub submission: SubmissionRequest,
    #[serde(skip_deserializing)]
    pub file_path: Option<String>,
}

/// 从 TOML 文件加载一份提交
pub async fn load_toml_to_submission(toml_file_path: &Path) -> Result<SubmissionFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut file: SubmissionFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    // 设置文件路径
    file.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(file)
}

/// 从文件夹中加载所有提交文件
pub async fn load_all_submissions(folder_path: &str) -> Result<Vec<SubmissionFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut submissions = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_to_submission(&path).await {
            Ok(file) => {
                tracing::info!("成功加载 {} 道作答", file.submission.responses.len());
                submissions.push(file);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(submissions)
}
