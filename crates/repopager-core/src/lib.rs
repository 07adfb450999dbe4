// Paging coordinator: decides per page whether the local cache is enough or
// a fresh page has to come from the search API, and keeps the two in sync
pub mod config;
pub mod error;
pub mod mediator;
pub mod models;
pub mod pager;
pub mod providers;
pub mod remote;
pub mod store;

pub use config::Config;
pub use error::Error;
pub use mediator::{PagingCoordinator, ShortCircuit, STARTING_PAGE_INDEX};
pub use models::{
    Item, LoadDirection, MediatorOutcome, PaginationCursor, PagingState, ScopeKey,
};
pub use pager::ScopedPager;
pub use providers::GitHubSearchClient;
pub use remote::{RemoteRepo, RemoteSearchClient};
pub use store::{LocalStore, StoreWriter};

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
