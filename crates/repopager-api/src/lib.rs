// HTTP client for the GitHub repository search endpoint
pub mod github;
pub mod retry;

// Re-export common types
pub use github::{GitHubClient, GitHubError, GitHubRepo, SearchResponse};
pub use retry::RetryConfig;
