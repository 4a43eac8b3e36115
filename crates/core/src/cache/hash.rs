//! Storage names for cache keys.
//!
//! Keys are full canonical URLs (query included), which are not safe to use
//! as file names. The file backend stores each page under the SHA-256 of its key.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a canonical URL.
pub fn storage_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Location of a page under `root`, sharded by the first two hex digits.
pub fn storage_path(root: &Path, url: &str) -> PathBuf {
    let key = storage_key(url);
    root.join(&key[..2]).join(format!("{key}.html"))
}
