use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use repopager_api::RetryConfig;
use repopager_cache::{RemoteKey, RepoCache};
use repopager_core::{
    Config, GitHubSearchClient, Item, LocalStore, PagingCoordinator, ScopeKey, ScopedPager,
    ShortCircuit,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "repopager")]
#[command(version, about = "Offline-first paging over GitHub repository search", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Config file to read (default: <config dir>/repopager/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "SQLite cache to use (default: <data dir>/repopager/github.db)"
    )]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Browse search results page by page, filling the cache as needed
    Search {
        /// Search query
        query: String,

        #[arg(long, default_value_t = 1, help = "How many pages to print")]
        pages: usize,

        #[arg(long, value_name = "N", help = "Items per page (default: from config)")]
        page_size: Option<u32>,

        #[arg(
            long,
            value_name = "POLICY",
            help = "all-directions, refresh-only or never (default: from config)"
        )]
        short_circuit: Option<ShortCircuit>,

        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "GitHub token")]
        token: Option<String>,
    },
    /// Show what the cache holds for a query without touching the network
    Cached {
        /// Search query
        query: String,

        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
    /// Drop a query's cached rows and cursors
    Clear {
        /// Search query
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - helps when things go sideways
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repopager=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let db_path = match cli.db {
        Some(ref path) => path.clone(),
        None => config.db_path()?,
    };

    match cli.command {
        Some(Commands::Search {
            query,
            pages,
            page_size,
            short_circuit,
            token,
        }) => {
            let store = open_cache(&db_path)?;
            search(&config, store, &query, pages, page_size, short_circuit, token).await
        }
        Some(Commands::Cached { query, json }) => {
            let store = open_cache(&db_path)?;
            cached(&store, &query, json)
        }
        Some(Commands::Clear { query }) => {
            let store = open_cache(&db_path)?;
            clear(&store, &query)
        }
        None => {
            println!("No command specified. Try --help");
            Ok(())
        }
    }
}

fn open_cache(path: &Path) -> anyhow::Result<Arc<RepoCache>> {
    let cache = RepoCache::open(path)
        .with_context(|| format!("Failed to open cache at {}", path.display()))?;
    Ok(Arc::new(cache))
}

async fn search(
    config: &Config,
    store: Arc<RepoCache>,
    query: &str,
    pages: usize,
    page_size: Option<u32>,
    short_circuit: Option<ShortCircuit>,
    token: Option<String>,
) -> anyhow::Result<()> {
    let mut github = config.github.clone();
    if token.is_some() {
        github.token = token;
    }
    let retry = RetryConfig {
        max_retries: config.paging.max_retries,
        ..RetryConfig::default()
    };
    let client = GitHubSearchClient::from_config(&github, retry)?;

    let policy = short_circuit.unwrap_or(config.paging.short_circuit);
    let page_size = page_size.unwrap_or(config.paging.page_size);
    let coordinator =
        PagingCoordinator::new(query, client, Arc::clone(&store)).with_short_circuit(policy);
    tracing::info!(
        "Searching '{}' ({:?}, {} per page)",
        coordinator.scope_key(),
        coordinator.short_circuit(),
        page_size
    );

    let mut pager = ScopedPager::new(coordinator, store, page_size);
    let mut shown = 0;
    for number in 1..=pages {
        let Some(page) = pager.next_page().await? else {
            break;
        };
        println!("-- page {} --", number);
        for item in page {
            print_item(item);
        }
        shown += page.len();
    }

    if pager.end_reached() {
        println!("({} results, end of results)", shown);
    } else {
        println!("({} results)", shown);
    }
    Ok(())
}

fn print_item(item: &Item) {
    println!(
        "{:<40} {:>7} stars  {}",
        item.full_name,
        item.star_count,
        item.language.as_deref().unwrap_or("-")
    );
    if let Some(ref description) = item.description {
        println!("    {}", description);
    }
}

#[derive(Serialize)]
struct CachedScope {
    scope_key: String,
    last_synced: Option<DateTime<Utc>>,
    items: Vec<CachedEntry>,
}

#[derive(Serialize)]
struct CachedEntry {
    #[serde(flatten)]
    item: Item,
    prev_page: Option<u32>,
    next_page: Option<u32>,
}

fn cached(store: &RepoCache, query: &str, json: bool) -> anyhow::Result<()> {
    let scope = ScopeKey::from_query(query);
    let total = LocalStore::count_by_scope(store, &scope)? as usize;

    let keys: HashMap<i64, RemoteKey> = store
        .remote_keys_by_scope(scope.as_str())?
        .into_iter()
        .map(|key| (key.repo_id, key))
        .collect();

    let items = store
        .items_by_scope(&scope, 0, total)?
        .into_iter()
        .map(|item| {
            let key = keys.get(&item.id);
            CachedEntry {
                prev_page: key.and_then(|k| k.prev_page),
                next_page: key.and_then(|k| k.next_page),
                item,
            }
        })
        .collect();
    let report = CachedScope {
        scope_key: scope.to_string(),
        last_synced: store.last_synced(scope.as_str())?,
        items,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.last_synced {
        Some(at) => println!("'{}': {} items, synced {}", report.scope_key, total, at),
        None => println!("'{}': nothing cached", report.scope_key),
    }
    for entry in &report.items {
        print_item(&entry.item);
        println!(
            "    prev={} next={}",
            page_label(entry.prev_page),
            page_label(entry.next_page)
        );
    }
    Ok(())
}

fn page_label(page: Option<u32>) -> String {
    page.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
}

fn clear(store: &RepoCache, query: &str) -> anyhow::Result<()> {
    let scope = ScopeKey::from_query(query);
    let (items, cursors) = store.run_transaction(|writer| {
        let cursors = writer.delete_cursors_by_scope(&scope)?;
        let items = writer.delete_items_by_scope(&scope)?;
        Ok((items, cursors))
    })?;
    println!("Cleared {} items and {} cursors for '{}'", items, cursors, scope);
    Ok(())
}
