//! # Sensor Platform
//!
//! The platform is what a config entry's setup is forwarded to. It turns an
//! entry into entities and drops them again on unload. The host keeps the
//! entities polled; the platform only builds them.

use anyhow::Result;
use async_trait::async_trait;
use provider_mstodo::{
    ImportantTasksData, ImportantTasksSensor, MsTodoClient, MIN_TIME_BETWEEN_UPDATES,
};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskbeacon_core::{ConfigEntry, Entity, EntryId, EntryStore};
use taskbeacon_oauth::{EntrySession, OAuthConfig};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Contract between the host and an entity platform.
#[async_trait]
pub trait SensorPlatform: Send + Sync {
    /// Platform identifier.
    fn domain(&self) -> &'static str;

    /// Create the entities for an entry.
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<Vec<Arc<dyn Entity>>>;

    /// Drop the entities of an entry. Returns `false` if none were set up.
    async fn unload_entry(&self, entry_id: &EntryId) -> Result<bool>;
}

/// Platform producing one important-tasks sensor per Microsoft To Do entry.
pub struct MsTodoPlatform {
    store: Arc<dyn EntryStore>,
    oauth: OAuthConfig,
    graph_base_url: String,
    http: Client,
    min_interval: Duration,
    sensors: RwLock<HashMap<EntryId, Arc<ImportantTasksSensor>>>,
}

impl MsTodoPlatform {
    pub const DOMAIN: &'static str = "mstodo";

    pub fn new(store: Arc<dyn EntryStore>, oauth: OAuthConfig, graph_base_url: String) -> Self {
        Self {
            store,
            oauth,
            graph_base_url,
            http: Client::new(),
            min_interval: MIN_TIME_BETWEEN_UPDATES,
            sensors: RwLock::new(HashMap::new()),
        }
    }

    /// Override the throttle window of created sensors.
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Sensor currently set up for an entry.
    pub async fn sensor(&self, entry_id: &EntryId) -> Option<Arc<ImportantTasksSensor>> {
        self.sensors.read().await.get(entry_id).cloned()
    }
}

#[async_trait]
impl SensorPlatform for MsTodoPlatform {
    fn domain(&self) -> &'static str {
        Self::DOMAIN
    }

    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<Vec<Arc<dyn Entity>>> {
        let session = EntrySession::with_http_client(
            entry.entry_id.clone(),
            Arc::clone(&self.store),
            self.oauth.clone(),
            self.http.clone(),
        );
        let client = MsTodoClient::with_base_url(Arc::new(session), self.graph_base_url.clone());
        let data = Arc::new(ImportantTasksData::with_min_interval(client, self.min_interval));
        let sensor = Arc::new(ImportantTasksSensor::new(entry.entry_id.clone(), data));

        self.sensors
            .write()
            .await
            .insert(entry.entry_id.clone(), Arc::clone(&sensor));

        info!(
            "Set up sensor '{}' for entry '{}'",
            sensor.name(),
            entry.entry_id
        );
        Ok(vec![sensor as Arc<dyn Entity>])
    }

    async fn unload_entry(&self, entry_id: &EntryId) -> Result<bool> {
        let removed = self.sensors.write().await.remove(entry_id).is_some();
        debug!("Unloaded platform for entry '{}': {}", entry_id, removed);
        Ok(removed)
    }
}
