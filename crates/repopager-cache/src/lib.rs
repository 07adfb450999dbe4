// SQLite-backed store for search results and their pagination keys
// Keeps API calls down and makes offline browsing possible

pub mod cache;
pub mod error;
pub mod migrations;
pub mod rows;

pub use cache::{CacheTransaction, RepoCache};
pub use error::CacheError;
pub use rows::{CachedRepo, RemoteKey};

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
