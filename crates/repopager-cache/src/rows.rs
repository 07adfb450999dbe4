use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One search hit as stored in the `repos` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRepo {
    /// Query scope the row was fetched under
    pub scope_key: String,
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub stars: u32,
    pub forks: u32,
    pub language: Option<String>,
    pub cached_at: DateTime<Utc>,
}

/// Page bookkeeping for one cached repo
///
/// Every key written for the same fetched page carries the same
/// `prev_page`/`next_page` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteKey {
    pub repo_id: i64,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}
