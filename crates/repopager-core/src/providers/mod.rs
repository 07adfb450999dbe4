// Search API adapters behind the RemoteSearchClient seam
pub mod github;

pub use github::GitHubSearchClient;
