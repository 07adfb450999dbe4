use repopager_api::GitHubError;
use repopager_cache::CacheError;
use thiserror::Error;

/// All the ways a page load can go wrong
///
/// `Transport` and `RemoteProtocol` come from the search API, `Store` from
/// the local cache. The coordinator never retries any of them; callers look
/// at [`Error::is_transient`] to decide whether another load is worth it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Remote search failed: {0}")]
    RemoteProtocol(String),

    #[error("Cache operation failed: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Transport failures may go away on their own; everything else needs a
    /// change on our side or the remote's
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<GitHubError> for Error {
    fn from(err: GitHubError) -> Self {
        if err.is_transport() {
            Error::Transport(err.to_string())
        } else {
            Error::RemoteProtocol(err.to_string())
        }
    }
}
