use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use taskbeacon_core::{EntryError, EntryId, EntryStore};
use tracing::{error, info};

use crate::client::{ClientCredentials, OAuthClient, OAuthConfig};
use crate::{OAuthError, Result};

// ============================================================================
// TokenSource Trait
// ============================================================================

/// Trait for components that need a bearer token.
///
/// Data sources ask for the current access token on every request and call
/// [`TokenSource::refresh`] when the API rejects it.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token.
    async fn access_token(&self) -> Result<String>;

    /// Obtain and store a new token pair.
    async fn refresh(&self) -> Result<()>;
}

// ============================================================================
// Entry-backed Session
// ============================================================================

/// Token source that reads tokens from a config entry and writes refreshed
/// tokens back to it.
pub struct EntrySession {
    entry_id: EntryId,
    store: Arc<dyn EntryStore>,
    config: OAuthConfig,
    http: Client,
}

impl EntrySession {
    pub fn new(entry_id: EntryId, store: Arc<dyn EntryStore>, config: OAuthConfig) -> Self {
        Self::with_http_client(entry_id, store, config, Client::new())
    }

    pub fn with_http_client(
        entry_id: EntryId,
        store: Arc<dyn EntryStore>,
        config: OAuthConfig,
        http: Client,
    ) -> Self {
        Self {
            entry_id,
            store,
            config,
            http,
        }
    }

    pub fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }
}

#[async_trait]
impl TokenSource for EntrySession {
    async fn access_token(&self) -> Result<String> {
        let entry = self
            .store
            .get(&self.entry_id)
            .await
            .ok_or_else(|| EntryError::NotFound(self.entry_id.clone()))?;
        Ok(entry.data.access_token)
    }

    /// Refresh the token pair and overwrite it in the entry.
    ///
    /// On failure the stored tokens are left untouched.
    async fn refresh(&self) -> Result<()> {
        let entry = self
            .store
            .get(&self.entry_id)
            .await
            .ok_or_else(|| EntryError::NotFound(self.entry_id.clone()))?;

        let client = OAuthClient::with_http_client(
            self.http.clone(),
            self.config.clone(),
            ClientCredentials::new(entry.data.client_id, entry.data.client_secret),
        );

        match client.refresh(&entry.data.refresh_token).await {
            Ok(tokens) => {
                self.store.update_tokens(&self.entry_id, tokens).await?;
                info!("Refreshed access token for entry '{}'", self.entry_id);
                Ok(())
            }
            Err(e) => {
                error!("Error refreshing token for entry '{}': {}", self.entry_id, e);
                Err(e)
            }
        }
    }
}

// ============================================================================
// Pass-through Source
// ============================================================================

/// Token source serving an already-obtained access token as-is.
#[derive(Clone)]
pub struct StaticTokenSource {
    access_token: String,
}

impl StaticTokenSource {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.access_token.clone())
    }

    async fn refresh(&self) -> Result<()> {
        Err(OAuthError::RefreshUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskbeacon_core::{ConfigEntry, EntryData, MemoryEntryStore, TokenPair};

    #[tokio::test]
    async fn test_static_token_source() {
        let source = StaticTokenSource::new("token123");
        assert_eq!(source.access_token().await.unwrap(), "token123");
        assert!(matches!(
            source.refresh().await,
            Err(OAuthError::RefreshUnsupported)
        ));
    }

    #[tokio::test]
    async fn test_entry_session_reads_current_token() {
        let store = Arc::new(MemoryEntryStore::new());
        let entry = ConfigEntry::new(
            "Microsoft To Do",
            EntryData::new("id", "secret", TokenPair::new("access-1", "refresh-1")),
        );
        let entry_id = entry.entry_id.clone();
        store.insert(entry).await.unwrap();

        let session = EntrySession::new(entry_id.clone(), store.clone(), OAuthConfig::microsoft());
        assert_eq!(session.access_token().await.unwrap(), "access-1");

        store
            .update_tokens(&entry_id, TokenPair::new("access-2", "refresh-2"))
            .await
            .unwrap();
        assert_eq!(session.access_token().await.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn test_entry_session_missing_entry() {
        let store = Arc::new(MemoryEntryStore::new());
        let session = EntrySession::new(EntryId::new("ghost"), store, OAuthConfig::microsoft());

        assert!(matches!(
            session.access_token().await,
            Err(OAuthError::Entry(EntryError::NotFound(_)))
        ));
    }
}
