use std::{collections::HashSet, sync::Arc};

use crate::{
    error::StoreError,
    model::LocationCandidate,
    store::{FAVORITES_KEY, KeyValueStore, load_json, save_json},
};

/// Saved locations, unique by structural key.
///
/// Loaded once; every mutation rewrites the whole list. Mutations take
/// `&mut self`, so only one can be in flight at a time.
#[derive(Debug)]
pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    favorites: Vec<LocationCandidate>,
}

impl FavoritesStore {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let favorites = match load_json::<Vec<LocationCandidate>>(store.as_ref(), FAVORITES_KEY) {
            Ok(Some(list)) => dedup(list),
            Ok(None) => Vec::new(),
            Err(StoreError::Serde { source, .. }) => {
                tracing::warn!("Ignoring unreadable favorites: {}", source);
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        tracing::debug!("Loaded {} favorite location(s)", favorites.len());
        Ok(Self { store, favorites })
    }

    pub fn list(&self) -> &[LocationCandidate] {
        &self.favorites
    }

    pub fn is_favorite(&self, location: &LocationCandidate) -> bool {
        self.position(location).is_some()
    }

    /// Add or remove `location`; returns whether it is a favorite afterwards.
    pub fn toggle(&mut self, location: &LocationCandidate) -> Result<bool, StoreError> {
        let mut next = self.favorites.clone();
        let now_favorite = match self.position(location) {
            Some(index) => {
                next.remove(index);
                false
            }
            None => {
                next.push(location.clone());
                true
            }
        };

        self.commit(next)?;
        Ok(now_favorite)
    }

    /// Remove `location` if present. Absent locations cause no write.
    pub fn remove(&mut self, location: &LocationCandidate) -> Result<(), StoreError> {
        let Some(index) = self.position(location) else {
            return Ok(());
        };

        let mut next = self.favorites.clone();
        next.remove(index);
        self.commit(next)
    }

    fn position(&self, location: &LocationCandidate) -> Option<usize> {
        let key = location.key();
        self.favorites.iter().position(|f| f.key() == key)
    }

    fn commit(&mut self, next: Vec<LocationCandidate>) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), FAVORITES_KEY, &next)?;
        self.favorites = next;
        Ok(())
    }
}

fn dedup(list: Vec<LocationCandidate>) -> Vec<LocationCandidate> {
    let mut seen = HashSet::new();
    list.into_iter().filter(|loc| seen.insert(loc.key())).collect()
}
