use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    models::{Item, LoadDirection, MediatorOutcome, PaginationCursor, PagingState, ScopeKey},
    remote::RemoteSearchClient,
    store::{blocking, LocalStore},
    Error, Result,
};

/// The search API numbers pages from 1
pub const STARTING_PAGE_INDEX: u32 = 1;

/// When a non-empty scope counts as already synchronized
///
/// The default skips the network for every direction as soon as the scope
/// has any stored rows, which also means Prepend/Append never fetch once a
/// Refresh has cached something. The other two variants narrow that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortCircuit {
    #[default]
    AllDirections,
    /// Only Refresh is answered from a non-empty cache
    RefreshOnly,
    /// Always go to the network
    Never,
}

impl ShortCircuit {
    pub fn applies_to(self, direction: LoadDirection) -> bool {
        match self {
            ShortCircuit::AllDirections => true,
            ShortCircuit::RefreshOnly => direction == LoadDirection::Refresh,
            ShortCircuit::Never => false,
        }
    }
}

impl std::str::FromStr for ShortCircuit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all_directions" | "all" => Ok(ShortCircuit::AllDirections),
            "refresh_only" | "refresh" => Ok(ShortCircuit::RefreshOnly),
            "never" | "off" => Ok(ShortCircuit::Never),
            other => Err(Error::ConfigError(format!(
                "Unknown short-circuit policy '{}' (expected all-directions, refresh-only or never)",
                other
            ))),
        }
    }
}

/// Where step one of a load ended up
enum PageTarget {
    Fetch(u32),
    Finished { end_of_pagination_reached: bool },
}

/// Keeps one query scope of the local store in sync with the search API
///
/// Each [`load`](Self::load) resolves the page to fetch from the stored
/// cursors, decides whether the cache already covers it, and otherwise
/// fetches the page and writes items plus cursors in one transaction. The
/// caller must not run two loads on the same coordinator at once, and must
/// issue a Refresh before any Prepend/Append.
pub struct PagingCoordinator<R, S> {
    scope: ScopeKey,
    remote: R,
    store: Arc<S>,
    short_circuit: ShortCircuit,
}

impl<R, S> PagingCoordinator<R, S>
where
    R: RemoteSearchClient,
    S: LocalStore,
{
    /// Coordinator for a raw user query; the scope key is derived from it
    pub fn new(query: &str, remote: R, store: Arc<S>) -> Self {
        Self::for_scope(ScopeKey::from_query(query), remote, store)
    }

    pub fn for_scope(scope: ScopeKey, remote: R, store: Arc<S>) -> Self {
        Self {
            scope,
            remote,
            store,
            short_circuit: ShortCircuit::default(),
        }
    }

    pub fn with_short_circuit(mut self, short_circuit: ShortCircuit) -> Self {
        self.short_circuit = short_circuit;
        self
    }

    pub fn scope_key(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn short_circuit(&self) -> ShortCircuit {
        self.short_circuit
    }

    /// Run one load. Failures come back as [`MediatorOutcome::Error`], never
    /// as a panic or an early return half way through a write.
    pub async fn load(&self, direction: LoadDirection, state: &PagingState) -> MediatorOutcome {
        let result = self.try_load(direction, state).await;
        if let Err(ref e) = result {
            warn!("{} load for '{}' failed: {}", direction, self.scope, e);
        }
        result.into()
    }

    async fn try_load(&self, direction: LoadDirection, state: &PagingState) -> Result<bool> {
        let page = match self.resolve_page(direction, state).await? {
            PageTarget::Fetch(page) => page,
            PageTarget::Finished {
                end_of_pagination_reached,
            } => {
                debug!(
                    "{} for '{}' resolved without a fetch (end: {})",
                    direction, self.scope, end_of_pagination_reached
                );
                return Ok(end_of_pagination_reached);
            }
        };

        if self.short_circuit.applies_to(direction) {
            let scope = self.scope.clone();
            let cached = blocking(&self.store, move |store| store.count_by_scope(&scope)).await?;
            if cached > 0 {
                debug!(
                    "'{}' already has {} cached items, skipping the network",
                    self.scope, cached
                );
                return Ok(false);
            }
        }

        if state.page_size == 0 {
            return Err(Error::ConfigError("page size must be positive".into()));
        }

        let items: Vec<Item> = self
            .remote
            .search(self.scope.as_str(), page, state.page_size)
            .await?
            .into_iter()
            .map(|repo| repo.into_item(&self.scope))
            .collect();
        let end_of_pagination_reached = items.is_empty();

        info!(
            "Fetched {} items for '{}' page {} ({})",
            items.len(),
            self.scope,
            page,
            direction
        );

        self.persist_page(direction, page, items).await?;
        Ok(end_of_pagination_reached)
    }

    /// Step one: which page does this load want, if any
    async fn resolve_page(&self, direction: LoadDirection, state: &PagingState) -> Result<PageTarget> {
        let target = match direction {
            LoadDirection::Refresh => {
                let cursor = self.cursor_closest_to_anchor(state).await?;
                let page = cursor
                    .and_then(|c| c.next_page)
                    .map(|next| next.saturating_sub(1).max(STARTING_PAGE_INDEX))
                    .unwrap_or(STARTING_PAGE_INDEX);
                PageTarget::Fetch(page)
            }
            LoadDirection::Prepend => match self.cursor_for_first_item(state).await? {
                // Refresh has not been committed yet; we will be asked again
                None => PageTarget::Finished {
                    end_of_pagination_reached: false,
                },
                Some(PaginationCursor {
                    prev_page: None, ..
                }) => PageTarget::Finished {
                    end_of_pagination_reached: true,
                },
                Some(PaginationCursor {
                    prev_page: Some(page),
                    ..
                }) => PageTarget::Fetch(page),
            },
            LoadDirection::Append => match self.cursor_for_last_item(state).await? {
                None => PageTarget::Finished {
                    end_of_pagination_reached: false,
                },
                Some(PaginationCursor {
                    next_page: None, ..
                }) => PageTarget::Finished {
                    end_of_pagination_reached: true,
                },
                Some(PaginationCursor {
                    next_page: Some(page),
                    ..
                }) => PageTarget::Fetch(page),
            },
        };
        Ok(target)
    }

    /// Steps three and four: write the fetched page and its cursors atomically
    async fn persist_page(&self, direction: LoadDirection, page: u32, items: Vec<Item>) -> Result<()> {
        let end_of_pagination_reached = items.is_empty();
        let prev_page = if page == STARTING_PAGE_INDEX {
            None
        } else {
            Some(page - 1)
        };
        let next_page = if end_of_pagination_reached {
            None
        } else {
            Some(page + 1)
        };
        let cursors: Vec<PaginationCursor> = items
            .iter()
            .map(|item| PaginationCursor {
                item_id: item.id,
                prev_page,
                next_page,
            })
            .collect();

        let scope = self.scope.clone();
        blocking(&self.store, move |store| {
            store.run_transaction(|writer| {
                if direction == LoadDirection::Refresh {
                    let cursors = writer.delete_cursors_by_scope(&scope)?;
                    let items = writer.delete_items_by_scope(&scope)?;
                    debug!("Cleared {} items and {} cursors of '{}'", items, cursors, scope);
                }

                writer.insert_or_replace_cursors(&scope, &cursors)?;
                writer.insert_or_replace_items(&items)?;

                if end_of_pagination_reached {
                    let closed = writer.close_cursors(&scope, direction, page)?;
                    debug!("Closed {} cursors of '{}' at page {}", closed, scope, page);
                }
                Ok(())
            })
        })
        .await
    }

    async fn cursor_for_item(&self, item_id: i64) -> Result<Option<PaginationCursor>> {
        let scope = self.scope.clone();
        blocking(&self.store, move |store| store.cursor_by_item_id(&scope, item_id)).await
    }

    async fn cursor_for_first_item(&self, state: &PagingState) -> Result<Option<PaginationCursor>> {
        match state.first_item() {
            Some(item) => self.cursor_for_item(item.id).await,
            None => Ok(None),
        }
    }

    async fn cursor_for_last_item(&self, state: &PagingState) -> Result<Option<PaginationCursor>> {
        match state.last_item() {
            Some(item) => self.cursor_for_item(item.id).await,
            None => Ok(None),
        }
    }

    async fn cursor_closest_to_anchor(&self, state: &PagingState) -> Result<Option<PaginationCursor>> {
        let item_id = state
            .anchor_position
            .and_then(|position| state.closest_item_to_position(position))
            .map(|item| item.id);
        match item_id {
            Some(id) => self.cursor_for_item(id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemoteSearchClient, RemoteRepo};
    use crate::store::StoreWriter;
    use repopager_cache::RepoCache;

    const PAGE_SIZE: u32 = 2;

    fn remote_repo(id: i64, stars: u32) -> RemoteRepo {
        RemoteRepo {
            id,
            name: format!("repo-{}", id),
            full_name: format!("owner/repo-{}", id),
            description: Some(format!("repo number {}", id)),
            url: format!("https://github.com/owner/repo-{}", id),
            star_count: stars,
            forks: 0,
            language: Some("Kotlin".into()),
        }
    }

    fn page_of(ids: &[i64]) -> Vec<RemoteRepo> {
        ids.iter().map(|&id| remote_repo(id, 100 - id as u32)).collect()
    }

    fn no_network() -> MockRemoteSearchClient {
        let mut remote = MockRemoteSearchClient::new();
        remote.expect_search().never();
        remote
    }

    fn coordinator(
        remote: MockRemoteSearchClient,
        store: &Arc<RepoCache>,
        policy: ShortCircuit,
    ) -> PagingCoordinator<MockRemoteSearchClient, RepoCache> {
        PagingCoordinator::new("kotlin", remote, Arc::clone(store)).with_short_circuit(policy)
    }

    fn stored(store: &RepoCache, scope: &ScopeKey) -> Vec<Item> {
        store.items_by_scope(scope, 0, 100).unwrap()
    }

    fn cursor(store: &RepoCache, scope: &ScopeKey, id: i64) -> Option<PaginationCursor> {
        store.cursor_by_item_id(scope, id).unwrap()
    }

    /// Seed a scope as if a Refresh of `page` had committed
    fn seed_page(store: &RepoCache, scope: &ScopeKey, ids: &[i64], prev: Option<u32>, next: Option<u32>) {
        let items: Vec<Item> = page_of(ids).into_iter().map(|r| r.into_item(scope)).collect();
        let cursors: Vec<PaginationCursor> = ids
            .iter()
            .map(|&id| PaginationCursor {
                item_id: id,
                prev_page: prev,
                next_page: next,
            })
            .collect();
        store
            .run_transaction(|w| {
                w.insert_or_replace_items(&items)?;
                w.insert_or_replace_cursors(scope, &cursors)
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_on_empty_store_fetches_first_page() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|query, page, page_size| {
                assert_eq!(query, "kotlin in:name,description");
                assert_eq!(page, STARTING_PAGE_INDEX);
                assert_eq!(page_size, PAGE_SIZE);
                Ok(page_of(&[1, 2]))
            });

        let coordinator = coordinator(remote, &store, ShortCircuit::AllDirections);
        let outcome = coordinator
            .load(LoadDirection::Refresh, &PagingState::new(PAGE_SIZE))
            .await;

        assert_eq!(outcome.end_of_pagination_reached(), Some(false));
        let scope = coordinator.scope_key();
        assert_eq!(LocalStore::count_by_scope(store.as_ref(), scope).unwrap(), 2);
        for id in [1, 2] {
            let c = cursor(&store, scope, id).unwrap();
            assert_eq!(c.prev_page, None);
            assert_eq!(c.next_page, Some(2));
        }
        assert!(stored(&store, scope).iter().all(|i| i.scope_key == *scope));
    }

    #[tokio::test]
    async fn test_refresh_uses_anchor_cursor() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[5, 6], Some(2), Some(4));

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, page, _| {
                assert_eq!(page, 3);
                Ok(page_of(&[5, 6]))
            });

        let loaded = stored(&store, &scope);
        let state = PagingState::new(PAGE_SIZE)
            .with_pages(vec![loaded])
            .with_anchor(1);
        let coordinator = coordinator(remote, &store, ShortCircuit::Never);
        let outcome = coordinator.load(LoadDirection::Refresh, &state).await;

        assert_eq!(outcome.end_of_pagination_reached(), Some(false));
        assert_eq!(
            cursor(&store, &scope, 5),
            Some(PaginationCursor {
                item_id: 5,
                prev_page: Some(2),
                next_page: Some(4),
            })
        );
    }

    #[tokio::test]
    async fn test_refresh_anchor_on_last_page_restarts_from_first() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[9], Some(3), None);

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, page, _| {
                assert_eq!(page, STARTING_PAGE_INDEX);
                Ok(page_of(&[1, 2]))
            });

        let state = PagingState::new(PAGE_SIZE)
            .with_pages(vec![stored(&store, &scope)])
            .with_anchor(0);
        let outcome = coordinator(remote, &store, ShortCircuit::Never)
            .load(LoadDirection::Refresh, &state)
            .await;

        assert!(outcome.is_success());
        // Refresh replaced the whole scope
        assert!(cursor(&store, &scope, 9).is_none());
        assert_eq!(stored(&store, &scope).len(), 2);
    }

    #[tokio::test]
    async fn test_prepend_and_append_before_refresh_do_nothing() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let coordinator = coordinator(no_network(), &store, ShortCircuit::Never);
        let scope = coordinator.scope_key().clone();

        // Items the caller shows but whose cursors are not stored yet
        let pending: Vec<Item> = page_of(&[1, 2]).into_iter().map(|r| r.into_item(&scope)).collect();
        for state in [
            PagingState::new(PAGE_SIZE),
            PagingState::new(PAGE_SIZE).with_pages(vec![pending.clone()]),
        ] {
            for direction in [LoadDirection::Prepend, LoadDirection::Append] {
                let outcome = coordinator.load(direction, &state).await;
                assert_eq!(outcome.end_of_pagination_reached(), Some(false));
            }
        }

        assert_eq!(LocalStore::count_by_scope(store.as_ref(), &scope).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prepend_on_first_page_is_end() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[1, 2], None, Some(2));

        let state = PagingState::new(PAGE_SIZE).with_pages(vec![stored(&store, &scope)]);
        let outcome = coordinator(no_network(), &store, ShortCircuit::Never)
            .load(LoadDirection::Prepend, &state)
            .await;

        assert_eq!(outcome.end_of_pagination_reached(), Some(true));
    }

    #[tokio::test]
    async fn test_append_past_last_page_skips_network() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[1, 2], None, None);

        let state = PagingState::new(PAGE_SIZE).with_pages(vec![stored(&store, &scope)]);
        for policy in [ShortCircuit::AllDirections, ShortCircuit::RefreshOnly, ShortCircuit::Never] {
            let outcome = coordinator(no_network(), &store, policy)
                .load(LoadDirection::Append, &state)
                .await;
            assert_eq!(outcome.end_of_pagination_reached(), Some(true));
        }
    }

    #[tokio::test]
    async fn test_cached_scope_short_circuits_every_direction_by_default() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[3, 4], Some(1), Some(3));

        let coordinator = coordinator(no_network(), &store, ShortCircuit::AllDirections);
        let state = PagingState::new(PAGE_SIZE).with_pages(vec![stored(&store, &scope)]);

        for direction in [LoadDirection::Refresh, LoadDirection::Prepend, LoadDirection::Append] {
            let outcome = coordinator.load(direction, &state).await;
            assert_eq!(outcome.end_of_pagination_reached(), Some(false));
        }
        assert_eq!(stored(&store, &scope).len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_only_policy_lets_append_fetch() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[1, 2], None, Some(2));

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, page, _| {
                assert_eq!(page, 2);
                Ok(page_of(&[3, 4]))
            });

        let state = PagingState::new(PAGE_SIZE).with_pages(vec![stored(&store, &scope)]);
        let outcome = coordinator(remote, &store, ShortCircuit::RefreshOnly)
            .load(LoadDirection::Append, &state)
            .await;

        assert_eq!(outcome.end_of_pagination_reached(), Some(false));
        assert_eq!(stored(&store, &scope).len(), 4);
        // Appending keeps the earlier page and links the new one
        assert_eq!(cursor(&store, &scope, 1).unwrap().next_page, Some(2));
        let new = cursor(&store, &scope, 3).unwrap();
        assert_eq!((new.prev_page, new.next_page), (Some(1), Some(3)));
    }

    #[tokio::test]
    async fn test_prepend_fetches_previous_page() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[5, 6], Some(2), Some(4));

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, page, _| {
                assert_eq!(page, 2);
                Ok(page_of(&[3, 4]))
            });

        let state = PagingState::new(PAGE_SIZE).with_pages(vec![stored(&store, &scope)]);
        let outcome = coordinator(remote, &store, ShortCircuit::RefreshOnly)
            .load(LoadDirection::Prepend, &state)
            .await;

        assert_eq!(outcome.end_of_pagination_reached(), Some(false));
        let new = cursor(&store, &scope, 3).unwrap();
        assert_eq!((new.prev_page, new.next_page), (Some(1), Some(3)));
        assert_eq!(cursor(&store, &scope, 5).unwrap().prev_page, Some(2));
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_store_untouched() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store, &scope, &[1, 2], None, Some(2));
        let before = stored(&store, &scope);

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, _, _| Err(Error::Transport("connection reset by peer".into())));

        let state = PagingState::new(PAGE_SIZE).with_pages(vec![before.clone()]);
        let outcome = coordinator(remote, &store, ShortCircuit::Never)
            .load(LoadDirection::Refresh, &state)
            .await;

        match outcome {
            MediatorOutcome::Error { cause } => assert!(cause.is_transient()),
            other => panic!("expected an error, got {:?}", other),
        }
        assert_eq!(stored(&store, &scope), before);
        assert_eq!(cursor(&store, &scope, 1).unwrap().next_page, Some(2));
    }

    #[tokio::test]
    async fn test_remote_protocol_error_is_reported() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, _, _| Err(Error::RemoteProtocol("Rate limit exceeded".into())));

        let outcome = coordinator(remote, &store, ShortCircuit::AllDirections)
            .load(LoadDirection::Refresh, &PagingState::new(PAGE_SIZE))
            .await;

        assert!(matches!(
            outcome,
            MediatorOutcome::Error {
                cause: Error::RemoteProtocol(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected_before_fetching() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let outcome = coordinator(no_network(), &store, ShortCircuit::AllDirections)
            .load(LoadDirection::Refresh, &PagingState::new(0))
            .await;

        assert!(matches!(
            outcome,
            MediatorOutcome::Error {
                cause: Error::ConfigError(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_refresh_only_clears_its_own_scope() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let java = ScopeKey::from_query("java");
        seed_page(&store, &java, &[1, 2, 3], None, Some(2));

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, _, _| Ok(page_of(&[1, 7])));

        let coordinator = coordinator(remote, &store, ShortCircuit::AllDirections);
        let outcome = coordinator
            .load(LoadDirection::Refresh, &PagingState::new(PAGE_SIZE))
            .await;

        assert!(outcome.is_success());
        let kotlin = coordinator.scope_key();
        assert_eq!(LocalStore::count_by_scope(store.as_ref(), kotlin).unwrap(), 2);
        assert_eq!(LocalStore::count_by_scope(store.as_ref(), &java).unwrap(), 3);
        // Same repo id, separate rows and cursors per scope
        assert_eq!(cursor(&store, &java, 1).unwrap().next_page, Some(2));
        assert!(cursor(&store, kotlin, 7).is_some());
    }

    #[tokio::test]
    async fn test_refresh_with_no_results_is_end_of_pagination() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let mut remote = MockRemoteSearchClient::new();
        remote.expect_search().times(1).returning(|_, _, _| Ok(Vec::new()));

        let coordinator = coordinator(remote, &store, ShortCircuit::AllDirections);
        let outcome = coordinator
            .load(LoadDirection::Refresh, &PagingState::new(PAGE_SIZE))
            .await;

        assert_eq!(outcome.end_of_pagination_reached(), Some(true));
        assert_eq!(
            LocalStore::count_by_scope(store.as_ref(), coordinator.scope_key()).unwrap(),
            0
        );
    }

    /// Store whose cursor writes always fail, to check rollback of the
    /// delete half of a Refresh
    struct BrokenCursorStore(RepoCache);

    struct BrokenWriter<'a>(&'a dyn StoreWriter);

    impl StoreWriter for BrokenWriter<'_> {
        fn insert_or_replace_items(&self, items: &[Item]) -> Result<()> {
            self.0.insert_or_replace_items(items)
        }

        fn insert_or_replace_cursors(&self, _: &ScopeKey, _: &[PaginationCursor]) -> Result<()> {
            Err(Error::Store("disk I/O error".into()))
        }

        fn delete_items_by_scope(&self, scope: &ScopeKey) -> Result<usize> {
            self.0.delete_items_by_scope(scope)
        }

        fn delete_cursors_by_scope(&self, scope: &ScopeKey) -> Result<usize> {
            self.0.delete_cursors_by_scope(scope)
        }

        fn close_cursors(&self, scope: &ScopeKey, direction: LoadDirection, page: u32) -> Result<usize> {
            self.0.close_cursors(scope, direction, page)
        }
    }

    impl LocalStore for BrokenCursorStore {
        fn count_by_scope(&self, scope: &ScopeKey) -> Result<u64> {
            LocalStore::count_by_scope(&self.0, scope)
        }

        fn cursor_by_item_id(&self, scope: &ScopeKey, item_id: i64) -> Result<Option<PaginationCursor>> {
            self.0.cursor_by_item_id(scope, item_id)
        }

        fn items_by_scope(&self, scope: &ScopeKey, offset: usize, limit: usize) -> Result<Vec<Item>> {
            self.0.items_by_scope(scope, offset, limit)
        }

        fn run_transaction<T, F>(&self, body: F) -> Result<T>
        where
            F: FnOnce(&dyn StoreWriter) -> Result<T>,
        {
            self.0.run_transaction(|writer| body(&BrokenWriter(writer)))
        }
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_whole_refresh() {
        let store = Arc::new(BrokenCursorStore(RepoCache::open_in_memory().unwrap()));
        let scope = ScopeKey::from_query("kotlin");
        seed_page(&store.0, &scope, &[1, 2], None, Some(2));

        let mut remote = MockRemoteSearchClient::new();
        remote
            .expect_search()
            .times(1)
            .returning(|_, _, _| Ok(page_of(&[3, 4])));

        let coordinator = PagingCoordinator::new("kotlin", remote, Arc::clone(&store))
            .with_short_circuit(ShortCircuit::Never);
        let outcome = coordinator
            .load(LoadDirection::Refresh, &PagingState::new(PAGE_SIZE))
            .await;

        assert!(matches!(outcome, MediatorOutcome::Error { cause: Error::Store(_) }));
        // The delete that ran before the failing insert was rolled back too
        let ids: Vec<i64> = stored(&store.0, &scope).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(cursor(&store.0, &scope, 2).unwrap().next_page, Some(2));
    }

    #[test]
    fn test_short_circuit_parsing() {
        assert_eq!("all-directions".parse::<ShortCircuit>().unwrap(), ShortCircuit::AllDirections);
        assert_eq!("Refresh_Only".parse::<ShortCircuit>().unwrap(), ShortCircuit::RefreshOnly);
        assert_eq!("never".parse::<ShortCircuit>().unwrap(), ShortCircuit::Never);
        assert!("sometimes".parse::<ShortCircuit>().is_err());
    }

    #[test]
    fn test_short_circuit_scope() {
        assert!(ShortCircuit::AllDirections.applies_to(LoadDirection::Append));
        assert!(ShortCircuit::RefreshOnly.applies_to(LoadDirection::Refresh));
        assert!(!ShortCircuit::RefreshOnly.applies_to(LoadDirection::Prepend));
        assert!(!ShortCircuit::Never.applies_to(LoadDirection::Refresh));
    }

    #[test]
    fn test_policy_defaults_to_all_directions() {
        let store = Arc::new(RepoCache::open_in_memory().unwrap());
        let coordinator = PagingCoordinator::new("kotlin", no_network(), Arc::clone(&store));
        assert_eq!(coordinator.short_circuit(), ShortCircuit::AllDirections);

        let coordinator = coordinator.with_short_circuit(ShortCircuit::Never);
        assert_eq!(coordinator.short_circuit(), ShortCircuit::Never);
    }
}
