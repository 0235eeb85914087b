//! 链接内容抓取
//!
//! GitHub 链接按回退链依次尝试：
//! raw 文件 → README(main) → README(master) → 仓库元数据 API → 页面文本。
//! 其它链接直接抓取页面并转为纯文本。全部失败时返回错误，由调用方决定兜底。

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

/// 页面文本最多保留的字符数
const MAX_CONTENT_CHARS: usize = 20_000;

/// 内容来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchSource {
    RawFile,
    Readme,
    RepoMetadata,
    PageText,
}

/// 抓取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedContent {
    pub url: String,
    pub content: String,
    pub source: FetchSource,
}

/// 回退链中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStep {
    pub url: String,
    pub source: FetchSource,
}

/// 链接抓取能力
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent>;
}

/// GitHub 链接解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubLocation {
    pub owner: String,
    pub repo: String,
    /// blob / tree 路径中的分支
    pub branch: Option<String>,
    pub path: Option<String>,
    pub is_blob: bool,
}

/// 解析 GitHub 链接，非 GitHub 链接返回 None
pub fn parse_github_url(url: &str) -> Option<GithubLocation> {
    let re = Regex::new(
        r"^https?://(?:www\.)?github\.com/([^/\s]+)/([^/\s#?]+)(?:/(blob|tree)/([^/\s]+)(?:/([^\s#?]*))?)?",
    )
    .ok()?;
    let caps = re.captures(url.trim())?;

    let owner = caps.get(1)?.as_str().to_string();
    let repo = caps.get(2)?.as_str().trim_end_matches(".git").to_string();
    let kind = caps.get(3).map(|m| m.as_str());
    let branch = caps.get(4).map(|m| m.as_str().to_string());
    let path = caps
        .get(5)
        .map(|m| m.as_str().trim_end_matches('/').to_string())
        .filter(|p| !p.is_empty());

    Some(GithubLocation {
        owner,
        repo,
        branch,
        path,
        is_blob: kind == Some("blob"),
    })
}

/// 生成 GitHub 链接的回退链（不含最后的页面抓取）
pub fn github_fetch_plan(location: &GithubLocation) -> Vec<FetchStep> {
    let raw_base = format!(
        "https://raw.githubusercontent.com/{}/{}",
        location.owner, location.repo
    );
    let mut steps = Vec::new();

    if location.is_blob {
        if let (Some(branch), Some(path)) = (&location.branch, &location.path) {
            steps.push(FetchStep {
                url: format!("{}/{}/{}", raw_base, branch, path),
                source: FetchSource::RawFile,
            });
        }
    } else if let Some(branch) = &location.branch {
        // tree 链接：先尝试该目录下的 README
        let dir = location
            .path
            .as_ref()
            .map(|p| format!("{}/", p))
            .unwrap_or_default();
        steps.push(FetchStep {
            url: format!("{}/{}/{}README.md", raw_base, branch, dir),
            source: FetchSource::Readme,
        });
    }

    for branch in ["main", "master"] {
        let step = FetchStep {
            url: format!("{}/{}/README.md", raw_base, branch),
            source: FetchSource::Readme,
        };
        if !steps.contains(&step) {
            steps.push(step);
        }
    }

    steps.push(FetchStep {
        url: format!(
            "https://api.github.com/repos/{}/{}",
            location.owner, location.repo
        ),
        source: FetchSource::RepoMetadata,
    });

    steps
}

/// HTML 转纯文本
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    if let Ok(re) = Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>") {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Ok(re) = Regex::new(r"(?s)<[^>]+>") {
        text = re.replace_all(&text, " ").into_owned();
    }
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_CONTENT_CHARS).collect()
}

/// 基于 reqwest 的抓取实现
pub struct HttpUrlFetcher {
    client: reqwest::Client,
    github_token: Option<String>,
}

impl HttpUrlFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent("grading-orchestrator")
            .build()
            .context("无法创建 HTTP 客户端")?;
        Ok(Self {
            client,
            github_token: config.github_token.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let mut request = self.client.get(url);
        if url.starts_with("https://api.github.com") {
            request = request.header("Accept", "application/vnd.github+json");
            if let Some(token) = &self.github_token {
                request = request.bearer_auth(token);
            }
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("请求失败: {}", url))?
            .error_for_status()
            .with_context(|| format!("响应状态异常: {}", url))?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            anyhow::bail!("响应内容为空: {}", url);
        }
        Ok(body)
    }

    async fn run_step(&self, step: &FetchStep) -> Result<String> {
        let body = self.get_text(&step.url).await?;
        match step.source {
            FetchSource::RepoMetadata => summarize_repo_metadata(&body),
            FetchSource::PageText => {
                let text = html_to_text(&body);
                if text.is_empty() {
                    anyhow::bail!("页面没有可读文本: {}", step.url);
                }
                Ok(text)
            }
            _ => Ok(body.chars().take(MAX_CONTENT_CHARS).collect()),
        }
    }
}

#[async_trait]
impl UrlFetcher for HttpUrlFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent> {
        let mut plan = parse_github_url(url)
            .map(|location| github_fetch_plan(&location))
            .unwrap_or_default();
        plan.push(FetchStep {
            url: url.to_string(),
            source: FetchSource::PageText,
        });

        for step in &plan {
            match self.run_step(step).await {
                Ok(content) => {
                    info!("✓ 链接内容抓取成功 ({:?}): {}", step.source, step.url);
                    return Ok(FetchedContent {
                        url: url.to_string(),
                        content,
                        source: step.source,
                    });
                }
                Err(e) => {
                    debug!("抓取步骤失败 {}: {}", step.url, e);
                }
            }
        }

        warn!("⚠️ 链接所有抓取方式均失败: {}", url);
        anyhow::bail!("无法访问链接: {}", url)
    }
}

#[derive(Deserialize)]
struct RepoMetadata {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    stargazers_count: u64,
}

fn summarize_repo_metadata(body: &str) -> Result<String> {
    let meta: RepoMetadata = serde_json::from_str(body).context("无法解析仓库元数据")?;
    Ok(format!(
        "Repository: {}\nDescription: {}\nPrimary language: {}\nTopics: {}\nStars: {}",
        meta.full_name,
        meta.description.unwrap_or_else(|| "(none)".to_string()),
        meta.language.unwrap_or_else(|| "(unknown)".to_string()),
        if meta.topics.is_empty() {
            "(none)".to_string()
        } else {
            meta.topics.join(", ")
        },
        meta.stargazers_count
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_url_plan_starts_with_raw_file() {
        let location =
            parse_github_url("https://github.com/acme/widgets/blob/dev/src/lib.rs").unwrap();
        assert!(location.is_blob);
        assert_eq!(location.branch.as_deref(), Some("dev"));
        assert_eq!(location.path.as_deref(), Some("src/lib.rs"));

        let plan = github_fetch_plan(&location);
        let urls: Vec<&str> = plan.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://raw.githubusercontent.com/acme/widgets/dev/src/lib.rs",
                "https://raw.githubusercontent.com/acme/widgets/main/README.md",
                "https://raw.githubusercontent.com/acme/widgets/master/README.md",
                "https://api.github.com/repos/acme/widgets",
            ]
        );
    }

    #[test]
    fn test_repo_root_plan() {
        let location = parse_github_url("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(location.repo, "widgets");
        assert!(!location.is_blob);

        let plan = github_fetch_plan(&location);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].source, FetchSource::Readme);
        assert_eq!(plan[2].source, FetchSource::RepoMetadata);
    }

    #[test]
    fn test_tree_url_tries_directory_readme_first() {
        let location = parse_github_url("https://github.com/acme/widgets/tree/main/docs").unwrap();
        let plan = github_fetch_plan(&location);
        assert_eq!(
            plan[0].url,
            "https://raw.githubusercontent.com/acme/widgets/main/docs/README.md"
        );
        // main README 不重复
        assert_eq!(plan.iter().filter(|s| s.url.ends_with("/main/README.md")).count(), 1);
    }

    #[test]
    fn test_non_github_url() {
        assert!(parse_github_url("https://example.com/acme/widgets").is_none());
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><h1>Title</h1><script>alert(1)</script><p>Hello &amp; welcome</p></body></html>"#;
        assert_eq!(html_to_text(html), "Title Hello & welcome");
    }

    #[test]
    fn test_repo_metadata_summary() {
        let body = r#"{"full_name": "acme/widgets", "description": "Widgets", "topics": ["rust"], "stargazers_count": 3}"#;
        let summary = summarize_repo_metadata(body).unwrap();
        assert!(summary.contains("Repository: acme/widgets"));
        assert!(summary.contains("Topics: rust"));
        assert!(summary.contains("Primary language: (unknown)"));
    }
}
