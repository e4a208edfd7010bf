//! # Entry Store
//!
//! Storage seam for config entries. The daemon keeps entries in memory;
//! providers only see the [`EntryStore`] trait, so token refreshes write
//! through to whatever store the host hands them.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::entry::{ConfigEntry, EntryId, EntryOptions, TokenPair};
use crate::error::{EntryError, Result};

/// Storage for config entries.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Get an entry by id.
    async fn get(&self, entry_id: &EntryId) -> Option<ConfigEntry>;

    /// List all entries, oldest first.
    async fn list(&self) -> Vec<ConfigEntry>;

    /// Add a new entry. Fails if an entry with the same id exists.
    async fn insert(&self, entry: ConfigEntry) -> Result<()>;

    /// Overwrite both tokens of an entry in place.
    async fn update_tokens(&self, entry_id: &EntryId, tokens: TokenPair) -> Result<ConfigEntry>;

    /// Replace the options of an entry.
    async fn update_options(
        &self,
        entry_id: &EntryId,
        options: EntryOptions,
    ) -> Result<ConfigEntry>;

    /// Delete an entry, returning it.
    async fn remove(&self, entry_id: &EntryId) -> Result<ConfigEntry>;
}

/// In-memory entry store.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<HashMap<EntryId, ConfigEntry>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn get(&self, entry_id: &EntryId) -> Option<ConfigEntry> {
        self.entries.read().await.get(entry_id).cloned()
    }

    async fn list(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        entries
    }

    async fn insert(&self, entry: ConfigEntry) -> Result<()> {
        entry.options.validate()?;

        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.entry_id) {
            return Err(EntryError::AlreadyExists(entry.entry_id));
        }
        entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    async fn update_tokens(&self, entry_id: &EntryId, tokens: TokenPair) -> Result<ConfigEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(entry_id)
            .ok_or_else(|| EntryError::NotFound(entry_id.clone()))?;
        entry.data.set_tokens(tokens);
        Ok(entry.clone())
    }

    async fn update_options(
        &self,
        entry_id: &EntryId,
        options: EntryOptions,
    ) -> Result<ConfigEntry> {
        options.validate()?;

        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(entry_id)
            .ok_or_else(|| EntryError::NotFound(entry_id.clone()))?;
        entry.options = options;
        Ok(entry.clone())
    }

    async fn remove(&self, entry_id: &EntryId) -> Result<ConfigEntry> {
        self.entries
            .write()
            .await
            .remove(entry_id)
            .ok_or_else(|| EntryError::NotFound(entry_id.clone()))
    }
}
