// Local store seam: the coordinator only sees these two traits, the SQLite
// cache implements them below
use std::sync::Arc;

use chrono::Utc;
use repopager_cache::{CacheTransaction, CachedRepo, RemoteKey, RepoCache};

use crate::{
    models::{Item, LoadDirection, PaginationCursor, ScopeKey},
    Result,
};

/// Scope-qualified, transactional storage for items and their cursors
///
/// Reads are point lookups or ordered windows. Writes only happen through
/// [`LocalStore::run_transaction`], which commits everything the body did or
/// nothing at all.
pub trait LocalStore: Send + Sync + 'static {
    fn count_by_scope(&self, scope: &ScopeKey) -> Result<u64>;

    fn cursor_by_item_id(&self, scope: &ScopeKey, item_id: i64) -> Result<Option<PaginationCursor>>;

    /// A window of the scope's items, most starred first, ties by name
    fn items_by_scope(&self, scope: &ScopeKey, offset: usize, limit: usize) -> Result<Vec<Item>>;

    fn run_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreWriter) -> Result<T>;
}

/// Writes available inside a store transaction
pub trait StoreWriter {
    /// Insert, replacing any row with the same `(scope, id)`
    fn insert_or_replace_items(&self, items: &[Item]) -> Result<()>;

    fn insert_or_replace_cursors(&self, scope: &ScopeKey, cursors: &[PaginationCursor])
        -> Result<()>;

    fn delete_items_by_scope(&self, scope: &ScopeKey) -> Result<usize>;

    fn delete_cursors_by_scope(&self, scope: &ScopeKey) -> Result<usize>;

    /// Record that `page` does not exist in `direction`: cursors that point
    /// at it lose that pointer. Returns the number of cursors touched.
    fn close_cursors(&self, scope: &ScopeKey, direction: LoadDirection, page: u32)
        -> Result<usize>;
}

/// Run a store call on the blocking pool
///
/// SQLite work stays off the async workers, and once started the closure
/// runs to completion even if the awaiting task is dropped.
pub(crate) async fn blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T>
where
    S: LocalStore,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref())).await?
}

impl LocalStore for RepoCache {
    fn count_by_scope(&self, scope: &ScopeKey) -> Result<u64> {
        Ok(RepoCache::count_by_scope(self, scope.as_str())?)
    }

    fn cursor_by_item_id(&self, scope: &ScopeKey, item_id: i64) -> Result<Option<PaginationCursor>> {
        let key = self.remote_key(scope.as_str(), item_id)?;
        Ok(key.map(cursor_from_key))
    }

    fn items_by_scope(&self, scope: &ScopeKey, offset: usize, limit: usize) -> Result<Vec<Item>> {
        let repos = self.repos_by_scope(scope.as_str(), offset, limit)?;
        Ok(repos.into_iter().map(item_from_row).collect())
    }

    fn run_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreWriter) -> Result<T>,
    {
        self.transaction(|tx: &CacheTransaction<'_>| body(tx))
    }
}

impl StoreWriter for CacheTransaction<'_> {
    fn insert_or_replace_items(&self, items: &[Item]) -> Result<()> {
        let cached_at = Utc::now();
        let rows: Vec<CachedRepo> = items
            .iter()
            .map(|item| CachedRepo {
                scope_key: item.scope_key.as_str().to_string(),
                id: item.id,
                name: item.name.clone(),
                full_name: item.full_name.clone(),
                description: item.description.clone(),
                url: item.url.clone(),
                stars: item.star_count,
                forks: item.forks,
                language: item.language.clone(),
                cached_at,
            })
            .collect();
        Ok(self.insert_repos(&rows)?)
    }

    fn insert_or_replace_cursors(
        &self,
        scope: &ScopeKey,
        cursors: &[PaginationCursor],
    ) -> Result<()> {
        let keys: Vec<RemoteKey> = cursors
            .iter()
            .map(|cursor| RemoteKey {
                repo_id: cursor.item_id,
                prev_page: cursor.prev_page,
                next_page: cursor.next_page,
            })
            .collect();
        Ok(self.insert_remote_keys(scope.as_str(), &keys)?)
    }

    fn delete_items_by_scope(&self, scope: &ScopeKey) -> Result<usize> {
        Ok(self.clear_repos_by_scope(scope.as_str())?)
    }

    fn delete_cursors_by_scope(&self, scope: &ScopeKey) -> Result<usize> {
        Ok(self.clear_remote_keys_by_scope(scope.as_str())?)
    }

    fn close_cursors(
        &self,
        scope: &ScopeKey,
        direction: LoadDirection,
        page: u32,
    ) -> Result<usize> {
        let touched = match direction {
            LoadDirection::Append => self.seal_next_page(scope.as_str(), page)?,
            LoadDirection::Prepend => self.seal_prev_page(scope.as_str(), page)?,
            LoadDirection::Refresh => 0,
        };
        Ok(touched)
    }
}

fn cursor_from_key(key: RemoteKey) -> PaginationCursor {
    PaginationCursor {
        item_id: key.repo_id,
        prev_page: key.prev_page,
        next_page: key.next_page,
    }
}

fn item_from_row(row: CachedRepo) -> Item {
    Item {
        id: row.id,
        name: row.name,
        full_name: row.full_name,
        description: row.description,
        url: row.url,
        star_count: row.stars,
        forks: row.forks,
        language: row.language,
        scope_key: ScopeKey::raw(row.scope_key),
    }
}
