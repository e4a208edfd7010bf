//! JSON-RPC API handlers for taskbeacon-daemon.
//!
//! This module defines the RPC interface. Flow methods drive the
//! [`FlowManager`]; entry, option and sensor methods go to the
//! [`EntryManager`] behind it.

use chrono::{DateTime, Utc};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskbeacon_core::{ConfigEntry, EntitySnapshot, EntryId, EntryOptions, EntryStore};

use crate::flow::{FlowManager, FlowResult, TokenImport};
use crate::manager::EntryManager;
use crate::poller::PollState;

/// Error code for failed operations.
pub const OPERATION_FAILED: i32 = -32000;
/// Error code for unknown entries and sensors.
pub const NOT_FOUND: i32 = -32001;

/// Config entry as reported over the API. Secrets and tokens are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub entry_id: EntryId,
    pub title: String,
    pub client_id: String,
    pub options: EntryOptions,
    pub loaded: bool,
    pub created_at: DateTime<Utc>,
}

impl EntrySummary {
    fn from_entry(entry: ConfigEntry, loaded: bool) -> Self {
        Self {
            entry_id: entry.entry_id,
            title: entry.title,
            client_id: entry.data.client_id,
            options: entry.options,
            loaded,
            created_at: entry.created_at,
        }
    }
}

/// The taskbeacon JSON-RPC interface.
#[rpc(server)]
pub trait TaskbeaconApi {
    /// Begin a config flow.
    #[method(name = "flow.start")]
    async fn flow_start(&self) -> RpcResult<FlowResult>;

    /// Submit the client credentials of a flow.
    #[method(name = "flow.credentials")]
    async fn flow_credentials(
        &self,
        flow_id: String,
        client_id: String,
        client_secret: String,
    ) -> RpcResult<FlowResult>;

    /// Complete a flow with the redirect URL the browser landed on.
    #[method(name = "flow.redirect")]
    async fn flow_redirect(&self, flow_id: String, redirect_url: String) -> RpcResult<FlowResult>;

    /// Create an entry from already-obtained tokens.
    #[method(name = "flow.tokens")]
    async fn flow_tokens(&self, tokens: TokenImport) -> RpcResult<FlowResult>;

    /// Re-authorize an existing entry.
    #[method(name = "flow.reauth")]
    async fn flow_reauth(&self, entry_id: String) -> RpcResult<FlowResult>;

    #[method(name = "entries.list")]
    async fn entries_list(&self) -> RpcResult<Vec<EntrySummary>>;

    /// Unload and delete an entry.
    #[method(name = "entries.remove")]
    async fn entries_remove(&self, entry_id: String) -> RpcResult<EntrySummary>;

    #[method(name = "entries.reload")]
    async fn entries_reload(&self, entry_id: String) -> RpcResult<bool>;

    #[method(name = "options.get")]
    async fn options_get(&self, entry_id: String) -> RpcResult<EntryOptions>;

    /// Change the scan interval of an entry and reload it.
    #[method(name = "options.update")]
    async fn options_update(
        &self,
        entry_id: String,
        scan_interval_minutes: u64,
    ) -> RpcResult<EntryOptions>;

    #[method(name = "sensors.list")]
    async fn sensors_list(&self) -> RpcResult<Vec<EntitySnapshot>>;

    #[method(name = "sensors.get")]
    async fn sensors_get(&self, unique_id: String) -> RpcResult<EntitySnapshot>;

    /// Run an update of one sensor now. The data source throttle still applies.
    #[method(name = "sensors.update")]
    async fn sensors_update(&self, unique_id: String) -> RpcResult<EntitySnapshot>;

    /// Poll schedule of every running sensor.
    #[method(name = "polls.status")]
    async fn polls_status(&self) -> RpcResult<HashMap<String, PollState>>;
}

/// Implementation of the taskbeacon API.
pub struct ApiImpl {
    flows: Arc<FlowManager>,
}

impl ApiImpl {
    pub fn new(flows: Arc<FlowManager>) -> Self {
        Self { flows }
    }

    fn manager(&self) -> &Arc<EntryManager> {
        self.flows.manager()
    }

    async fn stored_entry(&self, entry_id: &EntryId) -> RpcResult<ConfigEntry> {
        self.manager()
            .store()
            .get(entry_id)
            .await
            .ok_or_else(|| not_found(format!("Config entry not found: {}", entry_id)))
    }
}

fn failed(context: &str, e: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        OPERATION_FAILED,
        format!("{}: {}", context, e),
        None::<()>,
    )
}

fn not_found(message: String) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(NOT_FOUND, message, None::<()>)
}

#[jsonrpsee::core::async_trait]
impl TaskbeaconApiServer for ApiImpl {
    async fn flow_start(&self) -> RpcResult<FlowResult> {
        Ok(self.flows.start_user().await)
    }

    async fn flow_credentials(
        &self,
        flow_id: String,
        client_id: String,
        client_secret: String,
    ) -> RpcResult<FlowResult> {
        self.flows
            .submit_credentials(&flow_id, &client_id, &client_secret)
            .await
            .map_err(|e| failed("Failed to submit credentials", format!("{:#}", e)))
    }

    async fn flow_redirect(&self, flow_id: String, redirect_url: String) -> RpcResult<FlowResult> {
        self.flows
            .submit_redirect(&flow_id, &redirect_url)
            .await
            .map_err(|e| failed("Failed to complete flow", format!("{:#}", e)))
    }

    async fn flow_tokens(&self, tokens: TokenImport) -> RpcResult<FlowResult> {
        self.flows
            .import_tokens(tokens)
            .await
            .map_err(|e| failed("Failed to import tokens", format!("{:#}", e)))
    }

    async fn flow_reauth(&self, entry_id: String) -> RpcResult<FlowResult> {
        self.flows
            .start_reauth(&EntryId::new(entry_id))
            .await
            .map_err(|e| failed("Failed to start reauth", format!("{:#}", e)))
    }

    async fn entries_list(&self) -> RpcResult<Vec<EntrySummary>> {
        let manager = self.manager();
        let mut summaries = Vec::new();
        for entry in manager.store().list().await {
            let loaded = manager.is_loaded(&entry.entry_id).await;
            summaries.push(EntrySummary::from_entry(entry, loaded));
        }
        Ok(summaries)
    }

    async fn entries_remove(&self, entry_id: String) -> RpcResult<EntrySummary> {
        let entry_id = EntryId::new(entry_id);
        self.stored_entry(&entry_id).await?;
        let entry = self
            .manager()
            .remove_entry(&entry_id)
            .await
            .map_err(|e| failed("Failed to remove entry", format!("{:#}", e)))?;
        Ok(EntrySummary::from_entry(entry, false))
    }

    async fn entries_reload(&self, entry_id: String) -> RpcResult<bool> {
        let entry_id = EntryId::new(entry_id);
        self.stored_entry(&entry_id).await?;
        self.manager()
            .reload_entry(&entry_id)
            .await
            .map_err(|e| failed("Failed to reload entry", format!("{:#}", e)))
    }

    async fn options_get(&self, entry_id: String) -> RpcResult<EntryOptions> {
        Ok(self.stored_entry(&EntryId::new(entry_id)).await?.options)
    }

    async fn options_update(
        &self,
        entry_id: String,
        scan_interval_minutes: u64,
    ) -> RpcResult<EntryOptions> {
        let entry_id = EntryId::new(entry_id);
        self.stored_entry(&entry_id).await?;
        let options = EntryOptions::new(scan_interval_minutes)
            .map_err(|e| failed("Invalid options", e))?;
        let entry = self
            .manager()
            .update_options(&entry_id, options)
            .await
            .map_err(|e| failed("Failed to update options", format!("{:#}", e)))?;
        Ok(entry.options)
    }

    async fn sensors_list(&self) -> RpcResult<Vec<EntitySnapshot>> {
        Ok(self
            .manager()
            .entities()
            .await
            .iter()
            .map(|entity| EntitySnapshot::capture(entity.as_ref()))
            .collect())
    }

    async fn sensors_get(&self, unique_id: String) -> RpcResult<EntitySnapshot> {
        self.manager()
            .entity(&unique_id)
            .await
            .map(|entity| EntitySnapshot::capture(entity.as_ref()))
            .ok_or_else(|| not_found(format!("Sensor not found: {}", unique_id)))
    }

    async fn sensors_update(&self, unique_id: String) -> RpcResult<EntitySnapshot> {
        let entity = self
            .manager()
            .entity(&unique_id)
            .await
            .ok_or_else(|| not_found(format!("Sensor not found: {}", unique_id)))?;
        entity.update().await;
        Ok(EntitySnapshot::capture(entity.as_ref()))
    }

    async fn polls_status(&self) -> RpcResult<HashMap<String, PollState>> {
        Ok(self.manager().poll_states().await)
    }
}
