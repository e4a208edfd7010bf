//! Configuration file loading and management
//!
//! This module handles loading and parsing the daemon configuration from
//! `$XDG_CONFIG_HOME/taskbeacon/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use taskbeacon_core::{ConfigEntry, EntryData, EntryId, EntryOptions, TokenPair};
use taskbeacon_oauth::{OAuthConfig, AUTHORITY_URL, DEFAULT_REDIRECT_URI, DEFAULT_SCOPE};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Daemon-specific configuration
    pub daemon: DaemonConfig,
    /// Identity provider settings
    #[serde(default)]
    pub oauth: OAuthSettings,
    /// Microsoft Graph settings
    #[serde(default)]
    pub graph: GraphConfig,
    /// Polling defaults
    #[serde(default)]
    pub polling: PollingConfig,
    /// Entries with already-obtained tokens, imported at startup
    #[serde(default)]
    pub entries: HashMap<String, EntryConfig>,
}

/// Daemon server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Bind address for the JSON-RPC server
    /// Default: "127.0.0.1:3040"
    pub bind_address: String,
    /// Bind address for the OAuth callback view
    /// Default: "127.0.0.1:3041"
    pub callback_address: String,
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OAuthSettings {
    /// Authority base URL; `/authorize` and `/token` are appended
    pub authority: String,
    /// Redirect URI registered for the application
    pub redirect_uri: String,
    /// Requested scope
    pub scope: String,
}

/// Microsoft Graph configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph API root
    /// Default: "https://graph.microsoft.com/v1.0"
    pub base_url: String,
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Scan interval for entries that don't set their own
    /// Default: 1
    pub default_scan_interval_minutes: u64,
}

/// An entry configured directly with tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Overrides `polling.default_scan_interval_minutes`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval_minutes: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            oauth: OAuthSettings::default(),
            graph: GraphConfig::default(),
            polling: PollingConfig::default(),
            entries: HashMap::new(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3040".to_string(),
            callback_address: "127.0.0.1:3041".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            authority: AUTHORITY_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_scan_interval_minutes: 1,
        }
    }
}

impl OAuthSettings {
    pub fn oauth_config(&self) -> OAuthConfig {
        let mut config = OAuthConfig::with_authority(&self.authority)
            .with_redirect_uri(self.redirect_uri.clone());
        config.scope = self.scope.clone();
        config
    }
}

impl EntryConfig {
    /// Turn this section into a config entry named after its table key.
    pub fn to_entry(&self, name: &str, default_interval: u64) -> ConfigEntry {
        let options = EntryOptions {
            scan_interval_minutes: self.scan_interval_minutes.unwrap_or(default_interval),
        };
        ConfigEntry::new(
            name,
            EntryData::new(
                self.client_id.clone(),
                self.client_secret.clone(),
                TokenPair::new(self.access_token.clone(), self.refresh_token.clone()),
            ),
        )
        .with_id(EntryId::new(name))
        .with_options(options)
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the documented default configuration to `path` unless a file
    /// is already there.
    ///
    /// Returns `true` if the file was created.
    pub fn ensure_default_file(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::create_default_file(path)?;
        Ok(true)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/taskbeacon/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "raibid-labs", "taskbeacon")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# taskbeacon Daemon Configuration
# This file configures the taskbeacon-daemon behavior.

[daemon]
# Bind address for the JSON-RPC API server
# Default: "127.0.0.1:3040"
bind_address = "127.0.0.1:3040"

# Bind address for the OAuth callback view (/auth/external/callback)
# Default: "127.0.0.1:3041"
callback_address = "127.0.0.1:3041"

# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set.
# Default: "info"
log_level = "info"

[oauth]
# Microsoft identity platform authority
authority = "https://login.microsoftonline.com/common/oauth2/v2.0"

# Redirect URI registered for your Azure application.
# With the native-client URI you paste the redirect URL back via flow.redirect.
# To let the daemon receive the callback itself, register
# "http://127.0.0.1:3041/auth/external/callback" instead.
redirect_uri = "https://login.microsoftonline.com/common/oauth2/nativeclient"

scope = "Tasks.ReadWrite offline_access"

[graph]
base_url = "https://graph.microsoft.com/v1.0"

[polling]
# Minutes between polls for new entries
# Default: 1
default_scan_interval_minutes = 1

# Entries with tokens obtained elsewhere are imported at startup.
# The table key becomes the entry id.
#
# [entries.personal]
# client_id = "00000000-0000-0000-0000-000000000000"
# client_secret = "..."
# access_token = "..."
# refresh_token = "..."
# scan_interval_minutes = 5
"#
        .to_string()
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are valid and within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        self.daemon
            .bind_address
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid bind_address: {}", self.daemon.bind_address))?;

        self.daemon
            .callback_address
            .parse::<std::net::SocketAddr>()
            .with_context(|| {
                format!("Invalid callback_address: {}", self.daemon.callback_address)
            })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.daemon.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.daemon.log_level,
                valid_log_levels.join(", ")
            );
        }

        EntryOptions {
            scan_interval_minutes: self.polling.default_scan_interval_minutes,
        }
        .validate()
        .context("Invalid polling.default_scan_interval_minutes")?;

        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        let mut client_ids = HashSet::new();
        for name in names {
            let entry = &self.entries[name];
            if let Some(minutes) = entry.scan_interval_minutes {
                EntryOptions {
                    scan_interval_minutes: minutes,
                }
                .validate()
                .with_context(|| format!("Entry '{}': invalid scan_interval_minutes", name))?;
            }
            let fields = [
                ("client_id", &entry.client_id),
                ("client_secret", &entry.client_secret),
                ("access_token", &entry.access_token),
                ("refresh_token", &entry.refresh_token),
            ];
            for (field, value) in fields {
                if value.trim().is_empty() {
                    anyhow::bail!("Entry '{}': {} must not be empty", name, field);
                }
            }
            if !client_ids.insert(entry.client_id.trim()) {
                anyhow::bail!(
                    "Entry '{}': client_id '{}' is already used by another entry",
                    name,
                    entry.client_id
                );
            }
        }

        Ok(())
    }

    /// Config entries declared in the `[entries]` tables.
    pub fn configured_entries(&self) -> Vec<ConfigEntry> {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                self.entries[name].to_entry(name, self.polling.default_scan_interval_minutes)
            })
            .collect()
    }
}
