//! Config entry model.
//!
//! A config entry is the record of one configured Microsoft To Do account:
//! the application credentials, the current token pair, and user options.
//! Entries are created when a config flow completes and mutated in place
//! when tokens are refreshed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{EntryError, Result};

/// Title given to entries created by the config flow.
pub const DEFAULT_TITLE: &str = "Microsoft To Do";

const REDACTED: &str = "<redacted>";

/// Unique identifier for a config entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An OAuth access/refresh token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &REDACTED)
            .field("refresh_token", &REDACTED)
            .finish()
    }
}

/// Persisted credentials of a config entry.
///
/// Holds exactly the four fields the integration needs; nothing else is
/// stored per account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl EntryData {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tokens: TokenPair,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }

    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }

    /// Overwrite both tokens.
    pub fn set_tokens(&mut self, tokens: TokenPair) {
        self.access_token = tokens.access_token;
        self.refresh_token = tokens.refresh_token;
    }
}

impl fmt::Debug for EntryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryData")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("access_token", &REDACTED)
            .field("refresh_token", &REDACTED)
            .finish()
    }
}

/// Longest accepted scan interval: one day.
pub const MAX_SCAN_INTERVAL_MINUTES: u64 = 24 * 60;

/// User-adjustable options of a config entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Polling interval in minutes
    /// Default: 1
    pub scan_interval_minutes: u64,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            scan_interval_minutes: 1,
        }
    }
}

impl EntryOptions {
    pub fn new(scan_interval_minutes: u64) -> Result<Self> {
        let options = Self {
            scan_interval_minutes,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_minutes == 0 {
            return Err(EntryError::InvalidOptions(
                "scan_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.scan_interval_minutes > MAX_SCAN_INTERVAL_MINUTES {
            return Err(EntryError::InvalidOptions(format!(
                "scan_interval_minutes must be at most {}",
                MAX_SCAN_INTERVAL_MINUTES
            )));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes.saturating_mul(60))
    }
}

/// One configured integration instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: EntryId,
    pub title: String,
    pub data: EntryData,
    #[serde(default)]
    pub options: EntryOptions,
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    /// Create an entry with a fresh id and default options.
    pub fn new(title: impl Into<String>, data: EntryData) -> Self {
        Self {
            entry_id: EntryId::generate(),
            title: title.into(),
            data,
            options: EntryOptions::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, entry_id: EntryId) -> Self {
        self.entry_id = entry_id;
        self
    }

    pub fn with_options(mut self, options: EntryOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> EntryData {
        EntryData::new("client", "secret", TokenPair::new("access", "refresh"))
    }

    #[test]
    fn test_entry_data_holds_tokens() {
        let mut data = sample_data();
        assert_eq!(data.tokens(), TokenPair::new("access", "refresh"));

        data.set_tokens(TokenPair::new("access2", "refresh2"));
        assert_eq!(data.access_token, "access2");
        assert_eq!(data.refresh_token, "refresh2");
        assert_eq!(data.client_id, "client");
        assert_eq!(data.client_secret, "secret");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let data = EntryData::new("my-client", "s3cr3t", TokenPair::new("a-token", "r-token"));
        let rendered = format!("{:?}", data);
        assert!(rendered.contains("my-client"));
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("a-token"));
        assert!(!rendered.contains("r-token"));

        let rendered = format!("{:?}", TokenPair::new("a-token", "r-token"));
        assert!(!rendered.contains("a-token"));
        assert!(!rendered.contains("r-token"));
    }

    #[test]
    fn test_options_default_and_validation() {
        let options = EntryOptions::default();
        assert_eq!(options.scan_interval_minutes, 1);
        assert_eq!(options.scan_interval(), Duration::from_secs(60));

        assert!(EntryOptions::new(0).is_err());
        assert_eq!(EntryOptions::new(5).unwrap().scan_interval_minutes, 5);
    }

    #[test]
    fn test_options_reject_huge_interval() {
        let max = EntryOptions::new(MAX_SCAN_INTERVAL_MINUTES).unwrap();
        assert_eq!(max.scan_interval(), Duration::from_secs(24 * 60 * 60));

        assert!(EntryOptions::new(MAX_SCAN_INTERVAL_MINUTES + 1).is_err());
        assert!(EntryOptions::new(u64::MAX / 30).is_err());

        // Unvalidated values deserialized from elsewhere still don't overflow.
        let raw = EntryOptions {
            scan_interval_minutes: u64::MAX,
        };
        assert!(raw.validate().is_err());
        assert_eq!(raw.scan_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_entry_serialization_uses_data_fields() {
        let entry = ConfigEntry::new(DEFAULT_TITLE, sample_data()).with_id(EntryId::new("abc"));
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["entry_id"], "abc");
        let data = json["data"].as_object().unwrap();
        let mut keys: Vec<_> = data.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["access_token", "client_id", "client_secret", "refresh_token"]
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(EntryId::generate(), EntryId::generate());
    }
}
