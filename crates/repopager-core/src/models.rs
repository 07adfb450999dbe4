use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// GitHub search qualifier limiting matches to repo names and descriptions
pub const SEARCH_QUALIFIER: &str = "in:name,description";

/// Normalized query string that partitions cached rows
///
/// Two searches share rows only if they normalize to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Normalize a user query: collapse whitespace, lowercase, and pin the
    /// name/description qualifier
    pub fn from_query(query: &str) -> Self {
        let terms = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        if terms.is_empty() {
            return Self(SEARCH_QUALIFIER.to_string());
        }
        Self(format!("{} {}", terms, SEARCH_QUALIFIER))
    }

    /// Use an already-normalized key verbatim
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ScopeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One search result, tagged with the scope that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub star_count: u32,
    pub forks: u32,
    pub language: Option<String>,
    pub scope_key: ScopeKey,
}

/// Prev/next page bookkeeping for one stored item
///
/// Every cursor written for the same fetched page shares the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    pub item_id: i64,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

/// Which end of the loaded list a load extends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadDirection {
    /// Initial or forced reload
    Refresh,
    /// Load the page before the first loaded one
    Prepend,
    /// Load the page after the last loaded one
    Append,
}

impl std::fmt::Display for LoadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadDirection::Refresh => write!(f, "refresh"),
            LoadDirection::Prepend => write!(f, "prepend"),
            LoadDirection::Append => write!(f, "append"),
        }
    }
}

/// Snapshot of what the caller has loaded so far
#[derive(Debug, Clone, Default)]
pub struct PagingState {
    pub pages: Vec<Vec<Item>>,
    /// Position of the item last viewed, counted across all pages
    pub anchor_position: Option<usize>,
    pub page_size: u32,
}

impl PagingState {
    pub fn new(page_size: u32) -> Self {
        Self {
            pages: Vec::new(),
            anchor_position: None,
            page_size,
        }
    }

    pub fn with_pages(mut self, pages: Vec<Vec<Item>>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_anchor(mut self, anchor_position: usize) -> Self {
        self.anchor_position = Some(anchor_position);
        self
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// First item of the first non-empty page
    pub fn first_item(&self) -> Option<&Item> {
        self.pages.iter().find(|page| !page.is_empty())?.first()
    }

    /// Last item of the last non-empty page
    pub fn last_item(&self) -> Option<&Item> {
        self.pages.iter().rev().find(|page| !page.is_empty())?.last()
    }

    /// Item at `position`, or the nearest loaded one when it falls past the end
    pub fn closest_item_to_position(&self, position: usize) -> Option<&Item> {
        let count = self.item_count();
        if count == 0 {
            return None;
        }
        self.pages.iter().flatten().nth(position.min(count - 1))
    }
}

/// How a single load ended
#[derive(Debug)]
pub enum MediatorOutcome {
    Success { end_of_pagination_reached: bool },
    Error { cause: Error },
}

impl MediatorOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MediatorOutcome::Success { .. })
    }

    /// `Some(end)` for a success, `None` for an error
    pub fn end_of_pagination_reached(&self) -> Option<bool> {
        match self {
            MediatorOutcome::Success {
                end_of_pagination_reached,
            } => Some(*end_of_pagination_reached),
            MediatorOutcome::Error { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<bool> {
        match self {
            MediatorOutcome::Success {
                end_of_pagination_reached,
            } => Ok(end_of_pagination_reached),
            MediatorOutcome::Error { cause } => Err(cause),
        }
    }
}

impl From<Result<bool>> for MediatorOutcome {
    fn from(result: Result<bool>) -> Self {
        match result {
            Ok(end_of_pagination_reached) => MediatorOutcome::Success {
                end_of_pagination_reached,
            },
            Err(cause) => MediatorOutcome::Error { cause },
        }
    }
}
