use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskbeacon_core::TokenPair;
use tracing::debug;
use url::Url;

use crate::{OAuthError, Result, AUTHORITY_URL, DEFAULT_REDIRECT_URI, DEFAULT_SCOPE};

/// Identity-provider endpoints and request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub scope: String,
    pub redirect_uri: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::microsoft()
    }
}

impl OAuthConfig {
    /// Endpoints of the Microsoft identity platform (`common` tenant).
    pub fn microsoft() -> Self {
        Self::with_authority(AUTHORITY_URL)
    }

    /// Build endpoints below a custom authority, e.g. a tenant-specific one
    /// or a mock server in tests.
    pub fn with_authority(authority: &str) -> Self {
        let authority = authority.trim_end_matches('/');
        Self {
            authorize_url: format!("{}/authorize", authority),
            token_url: format!("{}/token", authority),
            scope: DEFAULT_SCOPE.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }
}

/// Application (client) credentials registered with the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client for the authorization-code grant.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    credentials: ClientCredentials,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, credentials: ClientCredentials) -> Self {
        Self::with_http_client(Client::new(), config, credentials)
    }

    /// Create a client sharing an existing HTTP connection pool.
    pub fn with_http_client(
        http: Client,
        config: OAuthConfig,
        credentials: ClientCredentials,
    ) -> Self {
        Self {
            http,
            config,
            credentials,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Build the URL the user visits to grant consent.
    pub fn authorization_url(&self, state: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", self.config.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| OAuthError::InvalidUrl(format!("{}: {}", self.config.authorize_url, e)))
    }

    /// Exchange an authorization code for an access/refresh token pair.
    ///
    /// A response without a refresh token is rejected, since polling cannot
    /// outlive the first access token without one.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self.request_token(&form).await?;
        let refresh_token = response.refresh_token.ok_or_else(|| {
            OAuthError::InvalidResponse("token response has no refresh_token".to_string())
        })?;

        Ok(TokenPair::new(response.access_token, refresh_token))
    }

    /// Redeem a refresh token for a new token pair.
    ///
    /// If the provider does not rotate the refresh token, the one passed in
    /// is kept.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self.request_token(&form).await?;
        let refresh_token = response
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(TokenPair::new(response.access_token, refresh_token))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
        debug!(
            "Token endpoint issued access token (expires_in: {:?})",
            token.expires_in
        );
        Ok(token)
    }
}
