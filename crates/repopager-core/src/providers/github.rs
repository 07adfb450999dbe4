// GitHub provider - bridges the API client with the RemoteSearchClient trait
use async_trait::async_trait;
use repopager_api::{GitHubClient, GitHubRepo, RetryConfig};

use crate::{config::GitHubConfig, remote::RemoteRepo, remote::RemoteSearchClient, Result};

/// Wrapper around GitHubClient that implements RemoteSearchClient
pub struct GitHubSearchClient {
    client: GitHubClient,
}

impl GitHubSearchClient {
    pub fn from_config(config: &GitHubConfig, retry: RetryConfig) -> Result<Self> {
        let client = GitHubClient::with_base_url(config.token.clone(), config.api_url.clone())?
            .with_retry_config(retry);
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteSearchClient for GitHubSearchClient {
    async fn search(&self, query: &str, page: u32, page_size: u32) -> Result<Vec<RemoteRepo>> {
        let response = self
            .client
            .search_repositories(query, page, page_size)
            .await?;

        Ok(response.items.into_iter().map(github_to_remote).collect())
    }
}

/// Convert a GitHub API repo to the provider-neutral shape
fn github_to_remote(gh: GitHubRepo) -> RemoteRepo {
    RemoteRepo {
        id: gh.id,
        name: gh.name,
        full_name: gh.full_name,
        description: gh.description,
        url: gh.html_url,
        star_count: gh.stargazers_count,
        forks: gh.forks_count,
        language: gh.language,
    }
}
