use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{models::Item, models::ScopeKey, Result};

/// A search hit as the remote API reports it, before it is tied to a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub star_count: u32,
    pub forks: u32,
    pub language: Option<String>,
}

impl RemoteRepo {
    pub fn into_item(self, scope_key: &ScopeKey) -> Item {
        Item {
            id: self.id,
            name: self.name,
            full_name: self.full_name,
            description: self.description,
            url: self.url,
            star_count: self.star_count,
            forks: self.forks,
            language: self.language,
            scope_key: scope_key.clone(),
        }
    }
}

/// Paginated repository search
///
/// Stateless: every call is one request for one page. Pages are 1-based and
/// an empty result means the page lies past the end of the results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSearchClient: Send + Sync {
    async fn search(&self, query: &str, page: u32, page_size: u32) -> Result<Vec<RemoteRepo>>;
}
