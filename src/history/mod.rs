//! In-memory history forest backed by persistent storage.
//!
//! [`HistoryGraph`] loads every stored entry at startup, keeps an id index
//! for constant-time lookups, and writes new entries through to the
//! [`Storage`] backend before they become visible.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::context::EntryLookup;
use crate::error::{StorageError, StorageResult};
use crate::storage::{HistoryEntry, Storage};

/// Default number of entries per history page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Id-indexed snapshot of the history forest.
#[derive(Debug, Default, Clone)]
pub struct HistoryIndex {
    entries: HashMap<String, HistoryEntry>,
    /// Ids in insertion order, oldest first.
    order: Vec<String>,
}

impl HistoryIndex {
    /// Build an index from entries in any order.
    pub fn from_entries(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut all: Vec<HistoryEntry> = entries.into_iter().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut index = Self::default();
        for entry in all {
            index.order.push(entry.id.clone());
            index.entries.insert(entry.id.clone(), entry);
        }
        index
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Get an entry by id.
    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.get(id)
    }

    fn insert(&mut self, entry: HistoryEntry) {
        self.order.push(entry.id.clone());
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Entries newest first.
    pub fn newest_first(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.order.iter().rev().filter_map(|id| self.entries.get(id))
    }

    /// Walk parent links from `id` (exclusive), at most `limit` entries.
    ///
    /// Stops at a root or at a dangling parent.
    pub fn ancestors(&self, id: &str, limit: usize) -> Vec<&HistoryEntry> {
        let mut found = Vec::new();
        let mut current = self.entries.get(id).and_then(|e| e.parent_id.as_deref());

        while let Some(parent_id) = current {
            if found.len() >= limit {
                break;
            }
            let Some(parent) = self.entries.get(parent_id) else {
                break;
            };
            found.push(parent);
            current = parent.parent_id.as_deref();
        }

        found
    }

    /// Direct children of `id`, oldest first.
    pub fn children(&self, id: &str) -> Vec<&HistoryEntry> {
        self.order
            .iter()
            .filter_map(|cid| self.entries.get(cid))
            .filter(|e| e.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// Entries without a parent, newest first.
    pub fn roots(&self) -> Vec<&HistoryEntry> {
        self.newest_first().filter(|e| e.is_root()).collect()
    }

    /// One page of entries, newest first. Pages are 1-based.
    pub fn page(&self, page: usize, per_page: usize) -> Vec<&HistoryEntry> {
        if page == 0 || per_page == 0 {
            return Vec::new();
        }
        self.newest_first()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect()
    }

    /// Number of pages of `per_page` entries.
    pub fn page_count(&self, per_page: usize) -> usize {
        if per_page == 0 {
            return 0;
        }
        self.len().div_ceil(per_page)
    }
}

impl EntryLookup for HistoryIndex {
    fn lookup(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.get(id)
    }
}

/// Shared, write-through history forest.
pub struct HistoryGraph {
    store: Arc<dyn Storage>,
    index: RwLock<HistoryIndex>,
}

impl HistoryGraph {
    /// Create an empty graph over `store` without loading it.
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self {
            store,
            index: RwLock::new(HistoryIndex::default()),
        }
    }

    /// Create a graph and load every stored entry.
    pub async fn load(store: Arc<dyn Storage>) -> StorageResult<Self> {
        let entries = store.list_entries().await?;
        info!(entries = entries.len(), "History loaded");

        Ok(Self {
            store,
            // Storage lists newest first; the stable sort keeps ties in insertion order
            index: RwLock::new(HistoryIndex::from_entries(entries.into_iter().rev())),
        })
    }

    /// The persistent store behind this graph.
    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Persist `entry` and add it to the index.
    ///
    /// The write lock is held across the store write, so concurrent inserts
    /// are serialized and a failed write leaves the index untouched.
    pub async fn insert(&self, entry: HistoryEntry) -> StorageResult<()> {
        let mut index = self.index.write().await;

        if index.contains(&entry.id) {
            return Err(StorageError::DuplicateEntry { entry_id: entry.id });
        }

        self.store.add_entry(&entry).await?;

        debug!(
            entry_id = %entry.id,
            parent_id = entry.parent_id.as_deref().unwrap_or("-"),
            "History entry inserted"
        );
        index.insert(entry);
        Ok(())
    }

    /// Get a clone of the entry with `id`.
    pub async fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.index.read().await.get(id).cloned()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Whether the graph is empty.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Read access to the index, for composing context without cloning.
    pub async fn read(&self) -> RwLockReadGuard<'_, HistoryIndex> {
        self.index.read().await
    }

    /// Ancestors of `id`, nearest first.
    pub async fn ancestors(&self, id: &str, limit: usize) -> Vec<HistoryEntry> {
        self.index
            .read()
            .await
            .ancestors(id, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Direct children of `id`.
    pub async fn children(&self, id: &str) -> Vec<HistoryEntry> {
        self.index
            .read()
            .await
            .children(id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Root entries, newest first.
    pub async fn roots(&self) -> Vec<HistoryEntry> {
        self.index.read().await.roots().into_iter().cloned().collect()
    }

    /// One page of entries, newest first. Pages are 1-based.
    pub async fn recent(&self, page: usize, per_page: usize) -> Vec<HistoryEntry> {
        self.index
            .read()
            .await
            .page(page, per_page)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of pages of `per_page` entries.
    pub async fn page_count(&self, per_page: usize) -> usize {
        self.index.read().await.page_count(per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::storage::SqliteStorage;
    use chrono::{Duration, Utc};

    fn entry_at(id: &str, parent: Option<&str>, offset_secs: i64) -> HistoryEntry {
        let mut e = HistoryEntry::new(id, ProviderKind::Groq, "llama3-8b-8192");
        e.id = id.to_string();
        e.parent_id = parent.map(str::to_string);
        e.created_at = Utc::now() + Duration::seconds(offset_secs);
        e
    }

    fn sample_index() -> HistoryIndex {
        HistoryIndex::from_entries(vec![
            entry_at("c", Some("b"), 2),
            entry_at("a", None, 0),
            entry_at("b", Some("a"), 1),
            entry_at("d", Some("a"), 3),
            entry_at("e", None, 4),
        ])
    }

    fn ids(entries: &[&HistoryEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_newest_first_ordering() {
        let index = sample_index();
        let order: Vec<&str> = index.newest_first().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["e", "d", "c", "b", "a"]);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let index = sample_index();
        assert_eq!(ids(&index.ancestors("c", 10)), vec!["b", "a"]);
        assert_eq!(ids(&index.ancestors("c", 1)), vec!["b"]);
        assert!(index.ancestors("a", 10).is_empty());
        assert!(index.ancestors("missing", 10).is_empty());
    }

    #[test]
    fn test_children_and_roots() {
        let index = sample_index();
        assert_eq!(ids(&index.children("a")), vec!["b", "d"]);
        assert_eq!(ids(&index.roots()), vec!["e", "a"]);
    }

    #[test]
    fn test_pagination() {
        let index = sample_index();
        assert_eq!(index.page_count(2), 3);
        assert_eq!(ids(&index.page(1, 2)), vec!["e", "d"]);
        assert_eq!(ids(&index.page(3, 2)), vec!["a"]);
        assert!(index.page(4, 2).is_empty());
        assert!(index.page(0, 2).is_empty());
        assert_eq!(index.page_count(0), 0);
    }

    #[tokio::test]
    async fn test_insert_writes_through_and_indexes() {
        let store = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let graph = HistoryGraph::new(store.clone());

        let entry = entry_at("root", None, 0);
        graph.insert(entry.clone()).await.unwrap();

        assert_eq!(graph.len().await, 1);
        assert_eq!(graph.get("root").await, Some(entry));
        assert!(store.get_entry("root").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let graph = HistoryGraph::new(store);

        graph.insert(entry_at("x", None, 0)).await.unwrap();
        let err = graph.insert(entry_at("x", None, 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEntry { .. }));
        assert_eq!(graph.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_restores_forest() {
        let store = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        {
            let graph = HistoryGraph::new(store.clone());
            graph.insert(entry_at("a", None, 0)).await.unwrap();
            graph.insert(entry_at("b", Some("a"), 1)).await.unwrap();
        }

        let reloaded = HistoryGraph::load(store).await.unwrap();
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.children("a").await.len(), 1);
        assert_eq!(reloaded.recent(1, DEFAULT_PAGE_SIZE).await[0].id, "b");
    }
}
