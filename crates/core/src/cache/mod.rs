//! Rendered-page cache.
//!
//! Maps a canonical URL to the html captured for it. Three storage backends
//! sit behind one contract:
//!
//! - `get` has no side effects on a miss
//! - `put_if_absent` stores only if nothing is stored yet; when callers race
//!   on one key exactly one of them gets `true`
//! - `invalidate` removes the page and reports whether one existed
//!
//! The backend is picked once from [`AppConfig::cache_mode`] and never changes.

pub mod connection;
pub mod file;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod pages;

pub use crate::Error;

pub use connection::CacheDb;
pub use file::FileCache;
pub use memory::MemoryCache;

use crate::config::{AppConfig, CacheMode};

/// The page cache with its configured backend.
#[derive(Debug)]
pub enum HtmlCache {
    /// SQLite; atomicity comes from `ON CONFLICT DO NOTHING`.
    Sqlite(CacheDb),
    /// In-process map; atomicity comes from the map's entry lock.
    Memory(MemoryCache),
    /// Local files; atomicity comes from hard-link creation.
    File(FileCache),
}

impl HtmlCache {
    /// Open the backend selected by `config.cache_mode`.
    ///
    /// # Errors
    ///
    /// Fails if the database or directory cannot be opened, or if file mode
    /// has no `cache_directory`. Callers treat this as fatal at start-up.
    pub async fn open(config: &AppConfig) -> Result<Self, Error> {
        let cache = match config.cache_mode {
            CacheMode::Sqlite => {
                HtmlCache::Sqlite(CacheDb::open(&config.db_path).await?.with_max_entries(config.cache_max_entries))
            }
            CacheMode::Memory => HtmlCache::Memory(MemoryCache::new()),
            CacheMode::File => HtmlCache::File(FileCache::open(config.require_cache_directory()?).await?),
        };

        tracing::info!(cache_mode = cache.mode().as_str(), "opened html cache");
        Ok(cache)
    }

    pub fn mode(&self) -> CacheMode {
        match self {
            HtmlCache::Sqlite(_) => CacheMode::Sqlite,
            HtmlCache::Memory(_) => CacheMode::Memory,
            HtmlCache::File(_) => CacheMode::File,
        }
    }

    /// Look up the html for a canonical URL.
    pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        match self {
            HtmlCache::Sqlite(db) => db.get_page(key).await,
            HtmlCache::Memory(mem) => Ok(mem.get(key)),
            HtmlCache::File(files) => files.get(key).await,
        }
    }

    /// Store `html` unless a page is already cached for `key`.
    pub async fn put_if_absent(&self, key: &str, html: &str) -> Result<bool, Error> {
        if key.is_empty() {
            return Err(Error::InvalidInput("cache key cannot be empty".into()));
        }

        match self {
            HtmlCache::Sqlite(db) => db.insert_page_if_absent(key, html).await,
            HtmlCache::Memory(mem) => Ok(mem.put_if_absent(key, html)),
            HtmlCache::File(files) => files.put_if_absent(key, html).await,
        }
    }

    /// Remove the cached page for `key`.
    pub async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        match self {
            HtmlCache::Sqlite(db) => db.delete_page(key).await,
            HtmlCache::Memory(mem) => Ok(mem.invalidate(key)),
            HtmlCache::File(files) => files.invalidate(key).await,
        }
    }
}
