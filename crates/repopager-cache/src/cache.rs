use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use crate::migrations::run_migrations;
use crate::{CacheError, CachedRepo, RemoteKey, Result};

/// Search-result cache backed by SQLite
///
/// Holds two tables, `repos` and `remote_keys`, both partitioned by scope
/// key. All access goes through one connection behind a mutex, so a write
/// transaction excludes every reader until it commits or rolls back.
pub struct RepoCache {
    conn: Mutex<Connection>,
}

impl RepoCache {
    /// Open (or create) the cache file and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        debug!("Opened cache at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of repos stored under a scope
    pub fn count_by_scope(&self, scope_key: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM repos WHERE scope_key = ?1",
            [scope_key],
            |row| row.get(0),
        )?;
        u64::try_from(count).map_err(|_| CacheError::InvalidValue(count.to_string()))
    }

    /// Remote key for one repo of a scope, if any was written
    pub fn remote_key(&self, scope_key: &str, repo_id: i64) -> Result<Option<RemoteKey>> {
        let conn = self.conn.lock();
        let key = conn
            .query_row(
                "SELECT repo_id, prev_page, next_page FROM remote_keys
                 WHERE scope_key = ?1 AND repo_id = ?2",
                params![scope_key, repo_id],
                remote_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    /// All remote keys of a scope, in repo id order
    pub fn remote_keys_by_scope(&self, scope_key: &str) -> Result<Vec<RemoteKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT repo_id, prev_page, next_page FROM remote_keys
             WHERE scope_key = ?1 ORDER BY repo_id",
        )?;
        let keys = stmt
            .query_map([scope_key], remote_key_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// A window of a scope's repos, most starred first, ties broken by name
    /// and then id so windows stay stable between calls
    pub fn repos_by_scope(
        &self,
        scope_key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CachedRepo>> {
        let offset = i64::try_from(offset).map_err(|_| CacheError::InvalidValue(offset.to_string()))?;
        let limit = i64::try_from(limit).map_err(|_| CacheError::InvalidValue(limit.to_string()))?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT scope_key, id, name, full_name, description, url, stars, forks, language, cached_at
             FROM repos WHERE scope_key = ?1
             ORDER BY stars DESC, name ASC, id ASC
             LIMIT ?2 OFFSET ?3",
        )?;
        let repos = stmt
            .query_map(params![scope_key, limit, offset], cached_repo_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(repos)
    }

    /// When the scope's most recent page was written
    pub fn last_synced(&self, scope_key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let latest: Option<i64> = conn.query_row(
            "SELECT MAX(cached_at) FROM repos WHERE scope_key = ?1",
            [scope_key],
            |row| row.get(0),
        )?;
        Ok(latest.and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }

    /// Run `f` inside one IMMEDIATE transaction
    ///
    /// Commits when `f` returns `Ok`; any error (from `f` or from COMMIT)
    /// rolls the whole batch back.
    pub fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&CacheTransaction<'_>) -> std::result::Result<T, E>,
        E: From<CacheError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(CacheError::from)?;
        let handle = CacheTransaction { tx };

        let value = f(&handle)?;
        handle.tx.commit().map_err(CacheError::from)?;
        Ok(value)
    }
}

/// Write handle that only exists inside [`RepoCache::transaction`]
pub struct CacheTransaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl CacheTransaction<'_> {
    pub fn insert_repos(&self, repos: &[CachedRepo]) -> Result<()> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT OR REPLACE INTO repos
                (scope_key, id, name, full_name, description, url, stars, forks, language, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for repo in repos {
            stmt.execute(params![
                repo.scope_key,
                repo.id,
                repo.name,
                repo.full_name,
                repo.description,
                repo.url,
                repo.stars,
                repo.forks,
                repo.language,
                repo.cached_at.timestamp(),
            ])?;
        }
        Ok(())
    }

    pub fn insert_remote_keys(&self, scope_key: &str, keys: &[RemoteKey]) -> Result<()> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT OR REPLACE INTO remote_keys (scope_key, repo_id, prev_page, next_page)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for key in keys {
            stmt.execute(params![scope_key, key.repo_id, key.prev_page, key.next_page])?;
        }
        Ok(())
    }

    pub fn clear_repos_by_scope(&self, scope_key: &str) -> Result<usize> {
        Ok(self
            .tx
            .execute("DELETE FROM repos WHERE scope_key = ?1", [scope_key])?)
    }

    pub fn clear_remote_keys_by_scope(&self, scope_key: &str) -> Result<usize> {
        Ok(self
            .tx
            .execute("DELETE FROM remote_keys WHERE scope_key = ?1", [scope_key])?)
    }

    /// Mark `page` as past the end: keys pointing forward to it lose their next page
    pub fn seal_next_page(&self, scope_key: &str, page: u32) -> Result<usize> {
        Ok(self.tx.execute(
            "UPDATE remote_keys SET next_page = NULL WHERE scope_key = ?1 AND next_page = ?2",
            params![scope_key, page],
        )?)
    }

    /// Mark `page` as before the start: keys pointing back to it lose their prev page
    pub fn seal_prev_page(&self, scope_key: &str, page: u32) -> Result<usize> {
        Ok(self.tx.execute(
            "UPDATE remote_keys SET prev_page = NULL WHERE scope_key = ?1 AND prev_page = ?2",
            params![scope_key, page],
        )?)
    }
}

fn remote_key_from_row(row: &Row<'_>) -> rusqlite::Result<RemoteKey> {
    Ok(RemoteKey {
        repo_id: row.get(0)?,
        prev_page: row.get(1)?,
        next_page: row.get(2)?,
    })
}

fn cached_repo_from_row(row: &Row<'_>) -> rusqlite::Result<CachedRepo> {
    let cached_at: i64 = row.get(9)?;
    Ok(CachedRepo {
        scope_key: row.get(0)?,
        id: row.get(1)?,
        name: row.get(2)?,
        full_name: row.get(3)?,
        description: row.get(4)?,
        url: row.get(5)?,
        stars: row.get(6)?,
        forks: row.get(7)?,
        language: row.get(8)?,
        cached_at: DateTime::from_timestamp(cached_at, 0).unwrap_or_default(),
    })
}
