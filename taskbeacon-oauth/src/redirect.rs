use url::Url;
use uuid::Uuid;

use crate::{OAuthError, Result};

/// What the identity provider hands back on the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Interpret redirect query parameters.
    ///
    /// An `error` parameter wins over any `code`; a missing or empty `code`
    /// is [`OAuthError::MissingCode`].
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in pairs {
            match key.as_ref() {
                "code" => code = Some(value.into()),
                "state" => state = Some(value.into()),
                "error" => error = Some(value.into()),
                "error_description" => description = Some(value.into()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(OAuthError::Denied { error, description });
        }

        match code {
            Some(code) if !code.trim().is_empty() => Ok(Self {
                code: code.trim().to_string(),
                state,
            }),
            _ => Err(OAuthError::MissingCode),
        }
    }
}

/// Parse a redirect URL pasted back by the user.
pub fn parse_redirect(input: &str) -> Result<AuthorizationResponse> {
    let url = Url::parse(input.trim()).map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
    AuthorizationResponse::from_query_pairs(url.query_pairs().into_owned())
}

/// Generate an unguessable value for the OAuth `state` parameter.
pub fn generate_state() -> String {
    Uuid::new_v4().simple().to_string()
}
