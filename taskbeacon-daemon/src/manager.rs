//! # Entry Manager
//!
//! Owns the setup/unload lifecycle of config entries.
//!
//! Setting up an entry records its runtime state in host storage, forwards
//! the setup to the sensor platform and starts polling the entities the
//! platform returns. Unloading reverses those steps in the opposite order.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use taskbeacon_core::{ConfigEntry, Entity, EntryId, EntryOptions, EntryStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::platform::SensorPlatform;
use crate::poller::{PollState, Poller};

/// Host-side state of a loaded entry.
pub struct EntryRuntime {
    pub entry_id: EntryId,
    pub entities: Vec<Arc<dyn Entity>>,
    pub loaded_at: DateTime<Utc>,
}

/// Manages config entries and their lifecycle.
///
/// # Example
///
/// ```no_run
/// use taskbeacon_daemon::manager::EntryManager;
/// use taskbeacon_daemon::platform::MsTodoPlatform;
/// use taskbeacon_core::{EntryStore, MemoryEntryStore};
/// use taskbeacon_oauth::OAuthConfig;
/// use std::sync::Arc;
///
/// let store: Arc<dyn EntryStore> = Arc::new(MemoryEntryStore::new());
/// let platform = MsTodoPlatform::new(
///     Arc::clone(&store),
///     OAuthConfig::microsoft(),
///     "https://graph.microsoft.com/v1.0".to_string(),
/// );
/// let manager = EntryManager::new(store, Arc::new(platform));
/// ```
pub struct EntryManager {
    store: Arc<dyn EntryStore>,
    platform: Arc<dyn SensorPlatform>,
    poller: Poller,
    data: RwLock<HashMap<EntryId, EntryRuntime>>,
}

impl EntryManager {
    pub fn new(store: Arc<dyn EntryStore>, platform: Arc<dyn SensorPlatform>) -> Self {
        Self {
            store,
            platform,
            poller: Poller::new(),
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Store a new entry and set it up.
    pub async fn add_entry(&self, entry: ConfigEntry) -> Result<bool> {
        let entry_id = entry.entry_id.clone();
        self.store
            .insert(entry)
            .await
            .with_context(|| format!("Failed to store entry '{}'", entry_id))?;
        info!("Added config entry '{}'", entry_id);
        self.setup_entry(&entry_id).await
    }

    /// Set up a stored entry.
    pub async fn setup_entry(&self, entry_id: &EntryId) -> Result<bool> {
        let entry = self
            .store
            .get(entry_id)
            .await
            .with_context(|| format!("Config entry not found: {}", entry_id))?;

        {
            let mut data = self.data.write().await;
            if data.contains_key(entry_id) {
                bail!("Config entry '{}' is already set up", entry_id);
            }
            data.insert(
                entry_id.clone(),
                EntryRuntime {
                    entry_id: entry_id.clone(),
                    entities: Vec::new(),
                    loaded_at: Utc::now(),
                },
            );
        }

        let entities = match self.platform.setup_entry(&entry).await {
            Ok(entities) => entities,
            Err(e) => {
                self.data.write().await.remove(entry_id);
                return Err(e.context(format!(
                    "Platform '{}' failed to set up entry '{}'",
                    self.platform.domain(),
                    entry_id
                )));
            }
        };

        for entity in &entities {
            self.poller
                .start(
                    entry_id.clone(),
                    Arc::clone(entity),
                    entry.options.scan_interval(),
                )
                .await;
        }

        if let Some(runtime) = self.data.write().await.get_mut(entry_id) {
            runtime.entities = entities;
        }

        info!("Set up config entry '{}' ({})", entry_id, entry.title);
        Ok(true)
    }

    /// Unload an entry. Returns `false` if it was not loaded.
    pub async fn unload_entry(&self, entry_id: &EntryId) -> Result<bool> {
        if !self.data.read().await.contains_key(entry_id) {
            return Ok(false);
        }

        self.poller.stop(entry_id).await;
        if !self.platform.unload_entry(entry_id).await? {
            warn!(
                "Platform '{}' had nothing set up for entry '{}'",
                self.platform.domain(),
                entry_id
            );
        }
        self.data.write().await.remove(entry_id);

        info!("Unloaded config entry '{}'", entry_id);
        Ok(true)
    }

    /// Unload and set up an entry again with its stored state.
    pub async fn reload_entry(&self, entry_id: &EntryId) -> Result<bool> {
        self.unload_entry(entry_id).await?;
        self.setup_entry(entry_id).await
    }

    /// Unload an entry and delete it from the store.
    pub async fn remove_entry(&self, entry_id: &EntryId) -> Result<ConfigEntry> {
        self.unload_entry(entry_id).await?;
        let entry = self.store.remove(entry_id).await?;
        info!("Removed config entry '{}'", entry_id);
        Ok(entry)
    }

    /// Store new options and reload the entry if it is loaded.
    pub async fn update_options(
        &self,
        entry_id: &EntryId,
        options: EntryOptions,
    ) -> Result<ConfigEntry> {
        let entry = self.store.update_options(entry_id, options).await?;
        if self.is_loaded(entry_id).await {
            self.reload_entry(entry_id).await?;
        }
        Ok(entry)
    }

    pub async fn is_loaded(&self, entry_id: &EntryId) -> bool {
        self.data.read().await.contains_key(entry_id)
    }

    pub async fn loaded_entries(&self) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self.data.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All entities of loaded entries.
    pub async fn entities(&self) -> Vec<Arc<dyn Entity>> {
        let data = self.data.read().await;
        let mut runtimes: Vec<&EntryRuntime> = data.values().collect();
        runtimes.sort_by(|a, b| a.loaded_at.cmp(&b.loaded_at));
        runtimes
            .into_iter()
            .flat_map(|runtime| runtime.entities.iter().cloned())
            .collect()
    }

    /// Look up an entity by unique id.
    pub async fn entity(&self, unique_id: &str) -> Option<Arc<dyn Entity>> {
        self.data
            .read()
            .await
            .values()
            .flat_map(|runtime| runtime.entities.iter())
            .find(|entity| entity.unique_id() == unique_id)
            .cloned()
    }

    pub async fn poll_states(&self) -> HashMap<String, PollState> {
        self.poller.states().await
    }

    /// Unload every loaded entry.
    pub async fn shutdown(&self) {
        info!("Unloading all config entries");
        for entry_id in self.loaded_entries().await {
            if let Err(e) = self.unload_entry(&entry_id).await {
                warn!("Failed to unload entry '{}': {}", entry_id, e);
            }
        }
    }
}
