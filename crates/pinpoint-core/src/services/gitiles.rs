//! Gitiles HTTP client.
//!
//! Gitiles prefixes JSON responses with `)]}'` to defeat XSSI, paginates
//! `+log` ranges through a `next` cursor, and serves raw files as base64 when
//! asked for `?format=TEXT`.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use super::{CommitInfo, Gitiles};
use crate::error::{ServiceError, ServiceResult};

const XSSI_PREFIX: &str = ")]}'";

#[derive(Debug, Deserialize)]
struct LogPage {
    log: Vec<CommitInfo>,
    #[serde(default)]
    next: Option<String>,
}

/// Gitiles client for any `https://<host>.googlesource.com/<project>` repository.
pub struct GitilesClient {
    http_client: reqwest::Client,
}

impl GitilesClient {
    pub fn new(user_agent: &str) -> ServiceResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self { http_client })
    }

    async fn get_text(&self, url: &str) -> ServiceResult<String> {
        debug!(url = %url, "gitiles request");
        let response = self.http_client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ServiceResult<T> {
        let body = self.get_text(url).await?;
        parse_json(&body)
    }
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> ServiceResult<T> {
    let body = body.strip_prefix(XSSI_PREFIX).unwrap_or(body);
    Ok(serde_json::from_str(body.trim_start())?)
}

pub(crate) fn decode_text(body: &str) -> ServiceResult<String> {
    let compact: String = body.split_whitespace().collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ServiceError::Decode(format!("file contents are not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| ServiceError::Decode(format!("file contents are not UTF-8: {e}")))
}

#[async_trait]
impl Gitiles for GitilesClient {
    async fn commit_info(&self, repository_url: &str, git_hash: &str) -> ServiceResult<CommitInfo> {
        let url = format!("{repository_url}/+/{git_hash}?format=JSON");
        self.get_json(&url).await.map_err(|e| match e {
            ServiceError::NotFound(_) => {
                ServiceError::NotFound(format!("{repository_url}@{git_hash}"))
            }
            other => other,
        })
    }

    async fn commit_range(
        &self,
        repository_url: &str,
        first_git_hash: &str,
        last_git_hash: &str,
    ) -> ServiceResult<Vec<CommitInfo>> {
        let base = format!("{repository_url}/+log/{first_git_hash}..{last_git_hash}?format=JSON");
        let mut commits = Vec::new();
        let mut url = base.clone();
        loop {
            let page: LogPage = self.get_json(&url).await?;
            commits.extend(page.log);
            match page.next {
                Some(next) => url = format!("{base}&s={next}"),
                None => break,
            }
        }
        Ok(commits)
    }

    async fn file_contents(
        &self,
        repository_url: &str,
        git_hash: &str,
        path: &str,
    ) -> ServiceResult<String> {
        let url = format!("{repository_url}/+/{git_hash}/{path}?format=TEXT");
        let body = self.get_text(&url).await?;
        decode_text(&body)
    }
}
