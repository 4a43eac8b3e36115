//! Rendered page storage in SQLite.
//!
//! One row per canonical URL. Inserts never overwrite: the first capture to
//! reach the database wins and later ones are reported as losers.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl CacheDb {
    /// Get the captured html for a canonical URL.
    pub async fn get_page(&self, url: &str) -> Result<Option<String>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT html FROM pages WHERE url = ?1", params![url], |row| row.get(0));

                match result {
                    Ok(html) => Ok(Some(html)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert a page unless one is already stored for the URL.
    ///
    /// Returns true when this call stored the page. When `max_entries` is set,
    /// the oldest captures beyond the limit are evicted after a successful insert.
    pub async fn insert_page_if_absent(&self, url: &str, html: &str) -> Result<bool, Error> {
        let url = url.to_string();
        let html = html.to_string();
        let captured_at = chrono::Utc::now().to_rfc3339();

        let inserted = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let changed = conn.execute(
                    "INSERT INTO pages (url, html, captured_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(url) DO NOTHING",
                    params![url, html, captured_at],
                )?;
                Ok(changed == 1)
            })
            .await
            .map_err(Error::from)?;

        if inserted && let Some(max) = self.max_entries {
            let evicted = self.purge_lru_pages(max).await?;
            if evicted > 0 {
                tracing::debug!(evicted, max_entries = max, "evicted oldest cached pages");
            }
        }

        Ok(inserted)
    }

    /// Delete the page stored for a URL.
    ///
    /// Returns whether a row was removed.
    pub async fn delete_page(&self, url: &str) -> Result<bool, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM pages WHERE url = ?1", params![url])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored pages.
    pub async fn count_pages(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge oldest captures until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_pages(&self, max_entries: usize) -> Result<u64, Error> {
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM pages WHERE url IN (
                        SELECT url FROM pages ORDER BY captured_at ASC, rowid ASC LIMIT ?1
                    )",
                    params![count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
