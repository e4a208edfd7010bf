//! # Config Flows
//!
//! Step-based flows that create (or re-authorize) config entries.
//!
//! A user flow collects the application credentials, hands out an
//! authorization URL and completes once the redirect comes back, either
//! pasted by the user ([`FlowManager::submit_redirect`]) or delivered to the
//! callback view ([`FlowManager::handle_callback`]). Already-obtained tokens
//! can be imported directly with [`FlowManager::import_tokens`].
//!
//! Every step answers with a [`FlowResult`]: another form to fill in (with
//! errors keyed like `base`), a created entry, or an abort reason.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskbeacon_core::entry::DEFAULT_TITLE;
use taskbeacon_core::{ConfigEntry, EntryData, EntryId, EntryStore, TokenPair};
use taskbeacon_oauth::{
    generate_state, parse_redirect, AuthorizationResponse, ClientCredentials, OAuthClient,
    OAuthConfig, OAuthError,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::manager::EntryManager;

pub const STEP_USER: &str = "user";
pub const STEP_AUTH: &str = "auth";
pub const STEP_TOKENS: &str = "tokens";

/// Flows not finished within this time are dropped.
pub const FLOW_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on flows in progress; the oldest is dropped to make room.
pub const MAX_ACTIVE_FLOWS: usize = 64;

/// Outcome of a flow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// The flow needs more input.
    Form {
        flow_id: String,
        step_id: String,
        #[serde(default)]
        errors: HashMap<String, String>,
        #[serde(default)]
        description_placeholders: HashMap<String, String>,
    },
    /// The flow finished and created an entry.
    CreateEntry {
        flow_id: String,
        entry_id: EntryId,
        title: String,
    },
    /// The flow ended without creating an entry.
    Abort {
        flow_id: Option<String>,
        reason: String,
    },
}

impl FlowResult {
    fn form(flow_id: &str, step_id: &str) -> Self {
        FlowResult::Form {
            flow_id: flow_id.to_string(),
            step_id: step_id.to_string(),
            errors: HashMap::new(),
            description_placeholders: HashMap::new(),
        }
    }

    fn form_error(flow_id: &str, step_id: &str, error: &str) -> Self {
        FlowResult::Form {
            flow_id: flow_id.to_string(),
            step_id: step_id.to_string(),
            errors: HashMap::from([("base".to_string(), error.to_string())]),
            description_placeholders: HashMap::new(),
        }
    }

    fn abort(flow_id: Option<&str>, reason: &str) -> Self {
        FlowResult::Abort {
            flow_id: flow_id.map(str::to_string),
            reason: reason.to_string(),
        }
    }

    /// The `base` form error, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            FlowResult::Form { errors, .. } => errors.get("base").map(String::as_str),
            _ => None,
        }
    }
}

/// Tokens handed over by the pass-through variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenImport {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenImport {
    fn is_complete(&self) -> bool {
        [
            &self.client_id,
            &self.client_secret,
            &self.access_token,
            &self.refresh_token,
        ]
        .iter()
        .all(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
enum FlowKind {
    User,
    Reauth(EntryId),
}

#[derive(Debug, Clone)]
struct FlowState {
    kind: FlowKind,
    credentials: Option<ClientCredentials>,
    oauth_state: Option<String>,
    started_at: Instant,
}

impl FlowState {
    fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            credentials: None,
            oauth_state: None,
            started_at: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.started_at.elapsed() >= FLOW_TTL
    }
}

/// Runs config flows against an [`EntryManager`].
pub struct FlowManager {
    manager: Arc<EntryManager>,
    oauth: OAuthConfig,
    http: Client,
    flows: Mutex<HashMap<String, FlowState>>,
    // Held across the already-configured check and the entry insert.
    create_lock: Mutex<()>,
}

impl FlowManager {
    pub fn new(manager: Arc<EntryManager>, oauth: OAuthConfig) -> Self {
        Self {
            manager,
            oauth,
            http: Client::new(),
            flows: Mutex::new(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    pub fn manager(&self) -> &Arc<EntryManager> {
        &self.manager
    }

    /// Number of flows in progress.
    pub async fn active_flows(&self) -> usize {
        let mut flows = self.flows.lock().await;
        Self::prune_expired(&mut flows);
        flows.len()
    }

    /// Begin a user flow; the first form asks for the client credentials.
    pub async fn start_user(&self) -> FlowResult {
        let flow_id = self.insert_flow(FlowState::new(FlowKind::User)).await;
        debug!("Started config flow {}", flow_id);
        FlowResult::form(&flow_id, STEP_USER)
    }

    /// Accept client credentials and hand out the authorization URL.
    pub async fn submit_credentials(
        &self,
        flow_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<FlowResult> {
        if self.live_flow(flow_id).await.is_none() {
            return Ok(FlowResult::abort(Some(flow_id), "unknown_flow"));
        }

        let client_id = client_id.trim();
        let client_secret = client_secret.trim();
        if client_id.is_empty() || client_secret.is_empty() {
            return Ok(FlowResult::form_error(
                flow_id,
                STEP_USER,
                "missing_credentials",
            ));
        }

        if self.is_configured(client_id).await {
            self.flows.lock().await.remove(flow_id);
            info!("Client '{}' is already configured", client_id);
            return Ok(FlowResult::abort(Some(flow_id), "already_configured"));
        }

        let credentials = ClientCredentials::new(client_id, client_secret);
        self.auth_step(flow_id, credentials).await
    }

    /// Complete the auth step with a redirect URL pasted by the user.
    pub async fn submit_redirect(&self, flow_id: &str, redirect_url: &str) -> Result<FlowResult> {
        let flow = match self.live_flow(flow_id).await {
            Some(flow) => flow,
            None => return Ok(FlowResult::abort(Some(flow_id), "unknown_flow")),
        };

        let response = match parse_redirect(redirect_url) {
            Ok(response) => response,
            Err(e) => return Ok(Self::redirect_error(flow_id, e)),
        };

        if let Some(state) = &response.state {
            if flow.oauth_state.as_deref() != Some(state.as_str()) {
                warn!("Redirect state does not match flow {}", flow_id);
                return Ok(FlowResult::form_error(flow_id, STEP_AUTH, "invalid_state"));
            }
        }

        self.finish(flow_id, flow, &response.code).await
    }

    /// Complete the flow whose `state` arrives at the callback view.
    pub async fn handle_callback(&self, query: HashMap<String, String>) -> Result<FlowResult> {
        let found = match query.get("state") {
            Some(state) => self
                .flows
                .lock()
                .await
                .iter()
                .filter(|(_, flow)| !flow.is_expired())
                .find(|(_, flow)| flow.oauth_state.as_deref() == Some(state.as_str()))
                .map(|(flow_id, flow)| (flow_id.clone(), flow.clone())),
            None => None,
        };

        let (flow_id, flow) = match found {
            Some(found) => found,
            None => {
                warn!("Callback does not belong to any flow");
                return Ok(FlowResult::abort(None, "unknown_flow"));
            }
        };

        match AuthorizationResponse::from_query_pairs(query) {
            Ok(response) => self.finish(&flow_id, flow, &response.code).await,
            Err(e) => Ok(Self::redirect_error(&flow_id, e)),
        }
    }

    /// Create an entry from tokens obtained elsewhere.
    pub async fn import_tokens(&self, tokens: TokenImport) -> Result<FlowResult> {
        let flow_id = Uuid::new_v4().to_string();
        if !tokens.is_complete() {
            return Ok(FlowResult::form_error(
                &flow_id,
                STEP_TOKENS,
                "missing_tokens",
            ));
        }

        let entry = ConfigEntry::new(
            DEFAULT_TITLE,
            EntryData::new(
                tokens.client_id.trim(),
                tokens.client_secret.trim(),
                TokenPair::new(tokens.access_token.trim(), tokens.refresh_token.trim()),
            ),
        );
        self.create_entry(&flow_id, entry).await
    }

    /// Re-authorize an existing entry with its stored credentials.
    pub async fn start_reauth(&self, entry_id: &EntryId) -> Result<FlowResult> {
        let entry = match self.manager.store().get(entry_id).await {
            Some(entry) => entry,
            None => return Ok(FlowResult::abort(None, "unknown_entry")),
        };

        let flow_id = self
            .insert_flow(FlowState::new(FlowKind::Reauth(entry_id.clone())))
            .await;
        info!("Started reauth flow {} for entry '{}'", flow_id, entry_id);

        let credentials = ClientCredentials::new(entry.data.client_id, entry.data.client_secret);
        self.auth_step(&flow_id, credentials).await
    }

    async fn auth_step(&self, flow_id: &str, credentials: ClientCredentials) -> Result<FlowResult> {
        let oauth_state = generate_state();
        let authorize_url = self
            .client(credentials.clone())
            .authorization_url(&oauth_state)
            .context("Failed to build authorization URL")?;

        {
            let mut flows = self.flows.lock().await;
            let Some(flow) = flows.get_mut(flow_id) else {
                bail!("Flow {} disappeared", flow_id);
            };
            flow.credentials = Some(credentials);
            flow.oauth_state = Some(oauth_state);
        }

        let mut result = FlowResult::form(flow_id, STEP_AUTH);
        if let FlowResult::Form {
            description_placeholders,
            ..
        } = &mut result
        {
            description_placeholders.insert("authorize_url".to_string(), authorize_url.to_string());
        }
        Ok(result)
    }

    async fn finish(&self, flow_id: &str, flow: FlowState, code: &str) -> Result<FlowResult> {
        let Some(credentials) = flow.credentials else {
            return Ok(FlowResult::form_error(flow_id, STEP_USER, "missing_credentials"));
        };

        let tokens = match self.client(credentials.clone()).exchange_code(code).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Token exchange for flow {} failed: {}", flow_id, e);
                return Ok(FlowResult::form_error(flow_id, STEP_AUTH, "auth_failed"));
            }
        };

        self.flows.lock().await.remove(flow_id);

        match flow.kind {
            FlowKind::User => {
                let entry = ConfigEntry::new(
                    DEFAULT_TITLE,
                    EntryData::new(credentials.client_id, credentials.client_secret, tokens),
                );
                self.create_entry(flow_id, entry).await
            }
            FlowKind::Reauth(entry_id) => {
                self.manager
                    .store()
                    .update_tokens(&entry_id, tokens)
                    .await
                    .with_context(|| format!("Failed to store tokens for '{}'", entry_id))?;
                if self.manager.is_loaded(&entry_id).await {
                    self.manager.reload_entry(&entry_id).await?;
                } else {
                    self.manager.setup_entry(&entry_id).await?;
                }
                info!("Re-authorized entry '{}'", entry_id);
                Ok(FlowResult::abort(Some(flow_id), "reauth_successful"))
            }
        }
    }

    async fn create_entry(&self, flow_id: &str, entry: ConfigEntry) -> Result<FlowResult> {
        let _guard = self.create_lock.lock().await;
        if self.is_configured(&entry.data.client_id).await {
            info!("Client '{}' is already configured", entry.data.client_id);
            return Ok(FlowResult::abort(Some(flow_id), "already_configured"));
        }

        let entry_id = entry.entry_id.clone();
        let title = entry.title.clone();
        self.manager.add_entry(entry).await?;

        info!("Flow {} created entry '{}'", flow_id, entry_id);
        Ok(FlowResult::CreateEntry {
            flow_id: flow_id.to_string(),
            entry_id,
            title,
        })
    }

    async fn insert_flow(&self, flow: FlowState) -> String {
        let flow_id = Uuid::new_v4().to_string();
        let mut flows = self.flows.lock().await;
        Self::prune_expired(&mut flows);

        while flows.len() >= MAX_ACTIVE_FLOWS {
            let oldest = flows
                .iter()
                .min_by_key(|(_, flow)| flow.started_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!("Dropping flow {} to make room", id);
                    flows.remove(&id);
                }
                None => break,
            }
        }

        flows.insert(flow_id.clone(), flow);
        flow_id
    }

    /// The flow with this id, unless it has expired.
    async fn live_flow(&self, flow_id: &str) -> Option<FlowState> {
        let mut flows = self.flows.lock().await;
        Self::prune_expired(&mut flows);
        flows.get(flow_id).cloned()
    }

    fn prune_expired(flows: &mut HashMap<String, FlowState>) {
        flows.retain(|flow_id, flow| {
            let keep = !flow.is_expired();
            if !keep {
                debug!("Flow {} expired", flow_id);
            }
            keep
        });
    }

    async fn is_configured(&self, client_id: &str) -> bool {
        self.manager
            .store()
            .list()
            .await
            .iter()
            .any(|entry| entry.data.client_id == client_id)
    }

    fn client(&self, credentials: ClientCredentials) -> OAuthClient {
        OAuthClient::with_http_client(self.http.clone(), self.oauth.clone(), credentials)
    }

    fn redirect_error(flow_id: &str, error: OAuthError) -> FlowResult {
        match error {
            OAuthError::InvalidUrl(_) | OAuthError::MissingCode => {
                FlowResult::form_error(flow_id, STEP_AUTH, "invalid_url")
            }
            e => {
                warn!("Authorization for flow {} failed: {}", flow_id, e);
                FlowResult::form_error(flow_id, STEP_AUTH, "auth_failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SensorPlatform;
    use async_trait::async_trait;
    use serde_json::json;
    use taskbeacon_core::{Entity, EntryStore, MemoryEntryStore};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoopPlatform;

    #[async_trait]
    impl SensorPlatform for NoopPlatform {
        fn domain(&self) -> &'static str {
            "noop"
        }

        async fn setup_entry(&self, _entry: &ConfigEntry) -> Result<Vec<Arc<dyn Entity>>> {
            Ok(Vec::new())
        }

        async fn unload_entry(&self, _entry_id: &EntryId) -> Result<bool> {
            Ok(true)
        }
    }

    fn flows(authority: &str) -> FlowManager {
        let store: Arc<dyn EntryStore> = Arc::new(MemoryEntryStore::new());
        let manager = Arc::new(EntryManager::new(store, Arc::new(NoopPlatform)));
        FlowManager::new(manager, OAuthConfig::with_authority(authority))
    }

    fn flow_id(result: &FlowResult) -> String {
        match result {
            FlowResult::Form { flow_id, .. } => flow_id.clone(),
            other => panic!("expected form, got {:?}", other),
        }
    }

    fn authorize_state(result: &FlowResult) -> String {
        let FlowResult::Form {
            description_placeholders,
            ..
        } = result
        else {
            panic!("expected form, got {:?}", result);
        };
        let url = url::Url::parse(&description_placeholders["authorize_url"]).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    async fn mock_token_endpoint(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=good-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": "new-access",
                "refresh_token": "new-refresh"
            })))
            .mount(server)
            .await;
    }

    async fn at_auth_step(flows: &FlowManager) -> (String, String) {
        let start = flows.start_user().await;
        let id = flow_id(&start);
        let auth = flows
            .submit_credentials(&id, "my-client", "my-secret")
            .await
            .unwrap();
        (id, authorize_state(&auth))
    }

    #[tokio::test]
    async fn test_start_user_asks_for_credentials() {
        let flows = flows("http://127.0.0.1:1");
        let result = flows.start_user().await;

        match result {
            FlowResult::Form { step_id, errors, .. } => {
                assert_eq!(step_id, "user");
                assert!(errors.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(flows.active_flows().await, 1);
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected() {
        let flows = flows("http://127.0.0.1:1");
        let id = flow_id(&flows.start_user().await);

        let result = flows.submit_credentials(&id, "client", " ").await.unwrap();
        assert_eq!(result.error(), Some("missing_credentials"));
    }

    #[tokio::test]
    async fn test_credentials_yield_authorize_url() {
        let flows = flows("https://login.example.com/common/oauth2/v2.0");
        let id = flow_id(&flows.start_user().await);

        let result = flows
            .submit_credentials(&id, "my-client", "my-secret")
            .await
            .unwrap();
        let FlowResult::Form {
            step_id,
            description_placeholders,
            ..
        } = &result
        else {
            panic!("expected form");
        };
        assert_eq!(step_id, "auth");
        let url = &description_placeholders["authorize_url"];
        assert!(url.starts_with("https://login.example.com/common/oauth2/v2.0/authorize?"));
        assert!(url.contains("client_id=my-client"));
        assert!(!url.contains("my-secret"));
        assert_eq!(authorize_state(&result).len(), 32);
    }

    #[tokio::test]
    async fn test_redirect_without_code_creates_nothing() {
        let flows = flows("http://127.0.0.1:1");
        let (id, _) = at_auth_step(&flows).await;

        let result = flows
            .submit_redirect(&id, "https://login.microsoftonline.com/nativeclient?foo=bar")
            .await
            .unwrap();
        assert_eq!(result.error(), Some("invalid_url"));

        let result = flows.submit_redirect(&id, "not a url").await.unwrap();
        assert_eq!(result.error(), Some("invalid_url"));

        assert!(flows.manager().store().list().await.is_empty());
        assert_eq!(flows.active_flows().await, 1);
    }

    #[tokio::test]
    async fn test_redirect_with_wrong_state() {
        let flows = flows("http://127.0.0.1:1");
        let (id, _) = at_auth_step(&flows).await;

        let result = flows
            .submit_redirect(&id, "https://host/cb?code=abc&state=forged")
            .await
            .unwrap();
        assert_eq!(result.error(), Some("invalid_state"));
        assert!(flows.manager().store().list().await.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_creates_entry_with_exchanged_tokens() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;

        let flows = flows(&server.uri());
        let (id, state) = at_auth_step(&flows).await;

        let result = flows
            .submit_redirect(
                &id,
                &format!("https://host/nativeclient?code=good-code&state={}", state),
            )
            .await
            .unwrap();

        let FlowResult::CreateEntry { entry_id, title, .. } = result else {
            panic!("expected entry, got {:?}", result);
        };
        assert_eq!(title, "Microsoft To Do");

        let entry = flows.manager().store().get(&entry_id).await.unwrap();
        assert_eq!(entry.data.client_id, "my-client");
        assert_eq!(entry.data.client_secret, "my-secret");
        assert_eq!(entry.data.access_token, "new-access");
        assert_eq!(entry.data.refresh_token, "new-refresh");
        assert_eq!(entry.options.scan_interval_minutes, 1);
        assert!(flows.manager().is_loaded(&entry_id).await);
        assert_eq!(flows.active_flows().await, 0);
    }

    #[tokio::test]
    async fn test_token_endpoint_failure_is_auth_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let flows = flows(&server.uri());
        let (id, _) = at_auth_step(&flows).await;

        let result = flows
            .submit_redirect(&id, "https://host/cb?code=stale")
            .await
            .unwrap();
        assert_eq!(result.error(), Some("auth_failed"));
        assert!(flows.manager().store().list().await.is_empty());
    }

    #[tokio::test]
    async fn test_callback_completes_matching_flow() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;

        let flows = flows(&server.uri());
        let (_, state) = at_auth_step(&flows).await;

        let query = HashMap::from([
            ("code".to_string(), "good-code".to_string()),
            ("state".to_string(), state),
        ]);
        let result = flows.handle_callback(query).await.unwrap();
        assert!(matches!(result, FlowResult::CreateEntry { .. }));
        assert_eq!(flows.manager().store().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state() {
        let flows = flows("http://127.0.0.1:1");
        at_auth_step(&flows).await;

        let query = HashMap::from([
            ("code".to_string(), "abc".to_string()),
            ("state".to_string(), "nobody".to_string()),
        ]);
        let result = flows.handle_callback(query).await.unwrap();
        assert_eq!(result, FlowResult::abort(None, "unknown_flow"));
    }

    #[tokio::test]
    async fn test_import_tokens() {
        let flows = flows("http://127.0.0.1:1");

        let incomplete = TokenImport {
            client_id: "c".into(),
            client_secret: "s".into(),
            access_token: "a".into(),
            ..Default::default()
        };
        let result = flows.import_tokens(incomplete).await.unwrap();
        assert_eq!(result.error(), Some("missing_tokens"));

        let complete = TokenImport {
            client_id: "c".into(),
            client_secret: "s".into(),
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        let result = flows.import_tokens(complete.clone()).await.unwrap();
        assert!(matches!(result, FlowResult::CreateEntry { .. }));

        let again = flows.import_tokens(complete).await.unwrap();
        assert!(matches!(
            again,
            FlowResult::Abort { ref reason, .. } if reason == "already_configured"
        ));
    }

    #[tokio::test]
    async fn test_already_configured_aborts_user_flow() {
        let flows = flows("http://127.0.0.1:1");
        flows
            .import_tokens(TokenImport {
                client_id: "my-client".into(),
                client_secret: "s".into(),
                access_token: "a".into(),
                refresh_token: "r".into(),
            })
            .await
            .unwrap();

        let id = flow_id(&flows.start_user().await);
        let result = flows
            .submit_credentials(&id, "my-client", "my-secret")
            .await
            .unwrap();
        assert!(matches!(
            result,
            FlowResult::Abort { ref reason, .. } if reason == "already_configured"
        ));
        assert_eq!(flows.active_flows().await, 0);
    }

    #[tokio::test]
    async fn test_second_flow_for_same_client_aborts_at_redirect() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;

        let flows = flows(&server.uri());
        let (first, first_state) = at_auth_step(&flows).await;
        let (second, second_state) = at_auth_step(&flows).await;

        let r1 = flows
            .submit_redirect(
                &first,
                &format!("https://host/cb?code=good-code&state={}", first_state),
            )
            .await
            .unwrap();
        assert!(matches!(r1, FlowResult::CreateEntry { .. }));

        let r2 = flows
            .submit_redirect(
                &second,
                &format!("https://host/cb?code=good-code&state={}", second_state),
            )
            .await
            .unwrap();
        assert!(matches!(
            r2,
            FlowResult::Abort { ref reason, .. } if reason == "already_configured"
        ));

        let entries = flows.manager().store().list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data.client_id, "my-client");
        assert_eq!(flows.active_flows().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_flow_expires() {
        let flows = flows("http://127.0.0.1:1");
        let id = flow_id(&flows.start_user().await);

        tokio::time::advance(FLOW_TTL - Duration::from_secs(1)).await;
        assert_eq!(flows.active_flows().await, 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let result = flows
            .submit_credentials(&id, "my-client", "my-secret")
            .await
            .unwrap();
        assert_eq!(result, FlowResult::abort(Some(&id), "unknown_flow"));
        assert_eq!(flows.active_flows().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_table_is_bounded() {
        let flows = flows("http://127.0.0.1:1");
        let first = flow_id(&flows.start_user().await);

        for _ in 0..MAX_ACTIVE_FLOWS + 10 {
            tokio::time::advance(Duration::from_millis(1)).await;
            flows.start_user().await;
        }
        assert_eq!(flows.active_flows().await, MAX_ACTIVE_FLOWS);

        let result = flows
            .submit_credentials(&first, "my-client", "my-secret")
            .await
            .unwrap();
        assert_eq!(result, FlowResult::abort(Some(&first), "unknown_flow"));
    }

    #[tokio::test]
    async fn test_reauth_updates_existing_entry() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;

        let flows = flows(&server.uri());
        let created = flows
            .import_tokens(TokenImport {
                client_id: "my-client".into(),
                client_secret: "my-secret".into(),
                access_token: "old-access".into(),
                refresh_token: "old-refresh".into(),
            })
            .await
            .unwrap();
        let FlowResult::CreateEntry { entry_id, .. } = created else {
            panic!("expected entry");
        };

        let auth = flows.start_reauth(&entry_id).await.unwrap();
        let id = flow_id(&auth);
        let state = authorize_state(&auth);

        let result = flows
            .submit_redirect(&id, &format!("https://host/cb?code=good-code&state={}", state))
            .await
            .unwrap();
        assert!(matches!(
            result,
            FlowResult::Abort { ref reason, .. } if reason == "reauth_successful"
        ));

        let entries = flows.manager().store().list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data.access_token, "new-access");
        assert_eq!(entries[0].data.refresh_token, "new-refresh");
        assert!(flows.manager().is_loaded(&entry_id).await);
    }

    #[tokio::test]
    async fn test_reauth_unknown_entry() {
        let flows = flows("http://127.0.0.1:1");
        let result = flows.start_reauth(&EntryId::new("ghost")).await.unwrap();
        assert_eq!(result, FlowResult::abort(None, "unknown_entry"));
    }

    #[test]
    fn test_flow_result_serialization() {
        let result = FlowResult::abort(Some("f1"), "already_configured");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "abort");
        assert_eq!(value["reason"], "already_configured");
    }
}
