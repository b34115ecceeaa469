// src/publish/github.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::PublicationTarget;
use crate::config::PublishConfig;

/// GitHub contents API: one commit per file write, on a fixed branch.
#[derive(Clone)]
pub struct GitHubTarget {
    client: Client,
    api_base: String,
    token: String,
    repo: String,
    branch: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl GitHubTarget {
    pub fn new(cfg: &PublishConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("NewsCurator/1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .context("building github http client")?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            repo: cfg.repo.clone(),
            branch: cfg.branch.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    /// Current file content and blob sha, `None` when the file does not exist.
    async fn fetch(&self, path: &str) -> Result<Option<(String, String)>> {
        let rsp = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("GET contents {path}"))?;

        if rsp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("github GET {path} HTTP {status}: {body}"));
        }

        let parsed: ContentsResponse = rsp
            .json()
            .await
            .with_context(|| format!("decoding contents of {path}"))?;
        let content = if parsed.encoding.is_empty() || parsed.encoding == "base64" {
            decode_content(&parsed.content).with_context(|| format!("base64 content of {path}"))?
        } else {
            parsed.content
        };
        Ok(Some((content, parsed.sha)))
    }
}

/// The API wraps base64 payloads at 60 columns.
pub fn decode_content(b64: &str) -> Result<String> {
    let compact: String = b64.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes())?;
    Ok(String::from_utf8(bytes)?)
}

#[async_trait]
impl PublicationTarget for GitHubTarget {
    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        Ok(self.fetch(path).await?.map(|(content, _)| content))
    }

    async fn write_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        // Updating an existing file requires its current blob sha.
        let sha = self.fetch(path).await?.map(|(_, sha)| sha);
        let body = PutContents {
            message,
            content: STANDARD.encode(content.as_bytes()),
            branch: &self.branch,
            sha,
        };

        let rsp = self
            .client
            .put(self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("PUT contents {path}"))?;

        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("github PUT {path} HTTP {status}: {text}"));
        }
        tracing::debug!(target: "publish", path, "file committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = STANDARD.encode("hello world, this is a longer file body".as_bytes());
        let wrapped = format!("{}\n{}\n", &encoded[..20], &encoded[20..]);
        assert_eq!(
            decode_content(&wrapped).unwrap(),
            "hello world, this is a longer file body"
        );
    }
}
