use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::{is_retryable_status, with_retry, RetryConfig};

const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("API request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication required")]
    AuthRequired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl GitHubError {
    /// True when the request never produced an HTTP response
    pub fn is_transport(&self) -> bool {
        matches!(self, GitHubError::NetworkError(_))
    }

    /// Whether sending the same request again could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GitHubError::NetworkError(_) => true,
            GitHubError::RequestFailed { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;

pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
    retry_config: RetryConfig,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_BASE.to_string())
    }

    /// For GitHub Enterprise or a local test server
    pub fn with_base_url(token: Option<String>, base_url: String) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("repopager/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn search_url(&self) -> String {
        format!("{}/search/repositories", self.base_url)
    }

    /// Fetch one page of repository search results, best-starred first.
    ///
    /// `page` is 1-based like the API itself.
    pub async fn search_repositories(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResponse> {
        let url = self.search_url();
        let token = self.token.clone();
        let page = page.to_string();
        let per_page = per_page.to_string();

        debug!("GET {} q={:?} page={} per_page={}", url, query, page, per_page);

        with_retry(&self.retry_config, GitHubError::is_transient, || async {
            let mut request = self.client.get(&url).query(&[
                ("q", query),
                ("sort", "stars"),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ]);

            if let Some(ref token) = token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(GitHubError::AuthRequired);
            }

            if status == reqwest::StatusCode::FORBIDDEN
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            {
                return Err(GitHubError::RateLimitExceeded);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GitHubError::RequestFailed {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = response.text().await?;
            parse_search_response(&body)
        })
        .await
    }
}

/// Decode the body of a `/search/repositories` response
pub fn parse_search_response(body: &str) -> Result<SearchResponse> {
    Ok(serde_json::from_str(body)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<GitHubRepo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
    pub language: Option<String>,
}
