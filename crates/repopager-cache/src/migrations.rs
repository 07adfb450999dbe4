//! Schema migrations
//!
//! v1 is the original unscoped layout, v2 adds the scope column to `repos`,
//! v3 re-keys both tables by `(scope_key, id)` so one repository can live in
//! several query scopes at once.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::{CacheError, Result};

pub const SCHEMA_VERSION: i32 = 3;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(CacheError::UnsupportedSchema {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    if current_version < 1 {
        apply(conn, 1, migrate_v1)?;
    }
    if current_version < 2 {
        apply(conn, 2, migrate_v2)?;
    }
    if current_version < 3 {
        apply(conn, 3, migrate_v3)?;
    }

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Run one migration step and bump the version in the same transaction
fn apply(conn: &Connection, version: i32, step: fn(&Connection) -> Result<()>) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    step(&tx)?;
    set_schema_version(&tx, version)?;
    tx.commit()?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("Running migration v1: initial schema");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS repos (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            description TEXT,
            url TEXT NOT NULL,
            stars INTEGER NOT NULL DEFAULT 0,
            forks INTEGER NOT NULL DEFAULT 0,
            language TEXT
        );

        CREATE TABLE IF NOT EXISTS remote_keys (
            repo_id INTEGER PRIMARY KEY,
            prev_page INTEGER,
            next_page INTEGER
        );
    "#,
    )?;

    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    info!("Running migration v2: scope column on repos");

    conn.execute(
        "ALTER TABLE repos ADD COLUMN scope_key TEXT NOT NULL DEFAULT ''",
        [],
    )?;

    Ok(())
}

fn migrate_v3(conn: &Connection) -> Result<()> {
    info!("Running migration v3: key repos and remote keys by scope");

    conn.execute_batch(
        r#"
        CREATE TABLE repos_scoped (
            scope_key TEXT NOT NULL,
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            description TEXT,
            url TEXT NOT NULL,
            stars INTEGER NOT NULL DEFAULT 0,
            forks INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            cached_at INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (scope_key, id)
        );

        INSERT INTO repos_scoped (scope_key, id, name, full_name, description, url, stars, forks, language)
            SELECT scope_key, id, name, full_name, description, url, stars, forks, language FROM repos;

        CREATE TABLE remote_keys_scoped (
            scope_key TEXT NOT NULL,
            repo_id INTEGER NOT NULL,
            prev_page INTEGER,
            next_page INTEGER,
            PRIMARY KEY (scope_key, repo_id)
        );

        INSERT INTO remote_keys_scoped (scope_key, repo_id, prev_page, next_page)
            SELECT r.scope_key, k.repo_id, k.prev_page, k.next_page
            FROM remote_keys k JOIN repos r ON r.id = k.repo_id;

        DROP TABLE remote_keys;
        DROP TABLE repos;
        ALTER TABLE repos_scoped RENAME TO repos;
        ALTER TABLE remote_keys_scoped RENAME TO remote_keys;

        CREATE INDEX IF NOT EXISTS idx_repos_scope_rank ON repos(scope_key, stars DESC, name ASC);
    "#,
    )?;

    Ok(())
}
