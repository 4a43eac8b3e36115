//! Process-local page store.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory page store keyed by canonical URL.
///
/// Contents are lost on restart; useful for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    pages: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.pages.get(url).map(|html| html.value().clone())
    }

    /// Insert unless present. The shard lock held by the entry makes this atomic per key.
    pub fn put_if_absent(&self, url: &str, html: &str) -> bool {
        match self.pages.entry(url.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(html.to_string());
                true
            }
        }
    }

    pub fn invalidate(&self, url: &str) -> bool {
        self.pages.remove(url).is_some()
    }
}
