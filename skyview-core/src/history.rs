use std::sync::Arc;

use crate::{
    error::StoreError,
    store::{KeyValueStore, RECENT_SEARCHES_KEY, load_json, save_json},
};

pub const MAX_RECENT_SEARCHES: usize = 5;

/// Most-recent-first list of submitted queries, persisted as a JSON array.
#[derive(Debug)]
pub struct RecentSearches {
    store: Arc<dyn KeyValueStore>,
    entries: Vec<String>,
}

impl RecentSearches {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let mut entries = match load_json::<Vec<String>>(store.as_ref(), RECENT_SEARCHES_KEY) {
            Ok(list) => list.unwrap_or_default(),
            Err(StoreError::Serde { source, .. }) => {
                tracing::warn!("Ignoring unreadable recent searches: {}", source);
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let mut seen = std::collections::HashSet::new();
        entries.retain(|q| seen.insert(q.clone()));
        entries.truncate(MAX_RECENT_SEARCHES);

        Ok(Self { store, entries })
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Move `query` to the front, dropping the oldest entry on overflow.
    pub fn record(&mut self, query: &str) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        next.retain(|q| q != query);
        next.insert(0, query.to_string());
        next.truncate(MAX_RECENT_SEARCHES);
        self.commit(next)
    }

    pub fn remove(&mut self, query: &str) -> Result<(), StoreError> {
        if !self.entries.iter().any(|q| q == query) {
            return Ok(());
        }
        let next = self.entries.iter().filter(|q| *q != query).cloned().collect();
        self.commit(next)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.commit(Vec::new())
    }

    fn commit(&mut self, next: Vec<String>) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), RECENT_SEARCHES_KEY, &next)?;
        self.entries = next;
        Ok(())
    }
}
