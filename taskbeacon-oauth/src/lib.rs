//! # taskbeacon-oauth
//!
//! OAuth2 plumbing for the Microsoft identity platform.
//!
//! This crate provides:
//! - [`OAuthClient`] - builds the authorization URL, exchanges codes, refreshes tokens
//! - [`parse_redirect`] - extracts the authorization code from a pasted redirect URL
//! - [`TokenSource`] - trait for components that need a bearer token
//! - [`EntrySession`] - token source backed by a stored config entry, with refresh
//! - [`StaticTokenSource`] - pass-through token source for already-obtained tokens
//!
//! ## Example
//!
//! ```no_run
//! use taskbeacon_oauth::{generate_state, ClientCredentials, OAuthClient, OAuthConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OAuthClient::new(
//!     OAuthConfig::microsoft(),
//!     ClientCredentials::new("client-id", "client-secret"),
//! );
//!
//! let state = generate_state();
//! println!("Log in at: {}", client.authorization_url(&state)?);
//!
//! let redirect = taskbeacon_oauth::parse_redirect(
//!     "https://login.microsoftonline.com/common/oauth2/nativeclient?code=abc&state=xyz",
//! )?;
//! let tokens = client.exchange_code(&redirect.code).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod redirect;
mod source;

pub use client::{ClientCredentials, OAuthClient, OAuthConfig};
pub use redirect::{generate_state, parse_redirect, AuthorizationResponse};
pub use source::{EntrySession, StaticTokenSource, TokenSource};

use taskbeacon_core::EntryError;
use thiserror::Error;

/// Microsoft identity platform authority used for personal and work accounts.
pub const AUTHORITY_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0";

/// Scope requested for To Do access; `offline_access` yields a refresh token.
pub const DEFAULT_SCOPE: &str = "Tasks.ReadWrite offline_access";

/// Redirect URI for desktop/native clients, where the user copies the URL back.
pub const DEFAULT_REDIRECT_URI: &str = "https://login.microsoftonline.com/common/oauth2/nativeclient";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid redirect URL: {0}")]
    InvalidUrl(String),

    #[error("Redirect URL does not contain an authorization code")]
    MissingCode,

    #[error("Authorization denied: {error}")]
    Denied {
        error: String,
        description: Option<String>,
    },

    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token source cannot refresh tokens")]
    RefreshUnsupported,

    #[error("Config entry error: {0}")]
    Entry(#[from] EntryError),
}

pub type Result<T> = std::result::Result<T, OAuthError>;
