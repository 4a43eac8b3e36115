//! Filesystem page store.
//!
//! Each page lives in its own file named after the hash of its canonical URL.
//! New pages are written to a temporary file first and then hard-linked into
//! place: the link fails if the target exists, so a stored page is never
//! overwritten and readers never observe a half-written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::hash::storage_path;
use crate::Error;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Page store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) the cache directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub async fn get(&self, url: &str) -> Result<Option<String>, Error> {
        match tokio::fs::read_to_string(storage_path(&self.root, url)).await {
            Ok(html) => Ok(Some(html)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn put_if_absent(&self, url: &str, html: &str) -> Result<bool, Error> {
        let target = storage_path(&self.root, url);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = target.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = tokio::fs::write(&temp, html.as_bytes()).await {
            discard_temp(&temp).await;
            return Err(e.into());
        }

        let linked = tokio::fs::hard_link(&temp, &target).await;
        discard_temp(&temp).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn invalidate(&self, url: &str) -> Result<bool, Error> {
        match tokio::fs::remove_file(storage_path(&self.root, url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Remove a temporary page file, whether or not it was fully written.
async fn discard_temp(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %temp.display(), "failed to remove temporary page file: {e}"),
    }
}
