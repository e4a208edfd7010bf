//! # provider-mstodo
//!
//! Microsoft To Do important-tasks sensor for taskbeacon.
//!
//! This provider polls Microsoft To Do through the Microsoft Graph API and
//! condenses every open, high-importance task into a single sensor state:
//! - Listing task lists (`GET /me/todo/lists`)
//! - Fetching tasks per list (`GET /me/todo/lists/{id}/tasks`)
//! - Selecting tasks with importance `high` and status `notStarted`/`inProgress`
//! - Joining their titles with newlines
//!
//! ## Authentication
//!
//! Requests carry a bearer token from a [`TokenSource`]. When Graph answers
//! the lists call with 401 the source is asked to refresh once.
//!
//! ## Example
//!
//! ```no_run
//! use provider_mstodo::{ImportantTasksData, MsTodoClient};
//! use taskbeacon_oauth::StaticTokenSource;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let client = MsTodoClient::new(Arc::new(StaticTokenSource::new("token123")));
//! let data = ImportantTasksData::new(client);
//!
//! data.update().await;
//! println!("{}", data.summary().unwrap_or_default());
//! # }
//! ```

mod data;
mod sensor;
mod summary;

pub use data::{ImportantTasks, ImportantTasksData, PollOutcome, MIN_TIME_BETWEEN_UPDATES};
pub use sensor::{ImportantTasksSensor, SENSOR_NAME};
pub use summary::{important_titles, summarize, NO_IMPORTANT_TASKS};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use taskbeacon_oauth::{OAuthError, TokenSource};
use thiserror::Error;
use tracing::debug;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum MsTodoError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] OAuthError),

    #[error("Access token rejected by Microsoft Graph")]
    Unauthorized,

    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, MsTodoError>;

// ============================================================================
// Microsoft Graph API Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TaskList {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "isOwner", default)]
    pub is_owner: bool,
    #[serde(rename = "isShared", default)]
    pub is_shared: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub importance: Option<Importance>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

impl TodoTask {
    /// High importance and not yet done.
    pub fn is_important_open(&self) -> bool {
        matches!(self.importance, Some(Importance::High))
            && matches!(
                self.status,
                Some(TaskStatus::NotStarted) | Some(TaskStatus::InProgress)
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Importance {
    Low,
    Normal,
    High,
    /// Any value this client does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    WaitingOnOthers,
    Deferred,
    #[serde(other)]
    Unknown,
}

/// One page of a Graph collection.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

// ============================================================================
// Graph Client
// ============================================================================

/// Microsoft To Do client.
///
/// Reads task lists and tasks from the Microsoft Graph API, following
/// `@odata.nextLink` until every page has been fetched.
pub struct MsTodoClient {
    token_source: Arc<dyn TokenSource>,
    client: Client,
    base_url: String,
}

impl MsTodoClient {
    const GRAPH_BASE_URL: &'static str = "https://graph.microsoft.com/v1.0";

    pub fn new(token_source: Arc<dyn TokenSource>) -> Self {
        Self::with_base_url(token_source, Self::GRAPH_BASE_URL.to_string())
    }

    /// Create a client against a custom Graph root (useful for testing).
    pub fn with_base_url(token_source: Arc<dyn TokenSource>, base_url: String) -> Self {
        Self {
            token_source,
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn token_source(&self) -> &Arc<dyn TokenSource> {
        &self.token_source
    }

    /// Fetch all task lists.
    pub async fn fetch_task_lists(&self) -> Result<Vec<TaskList>> {
        let url = self.endpoint(&["me", "todo", "lists"])?;
        self.get_all(url, "task lists").await
    }

    /// Fetch all tasks of one list.
    pub async fn fetch_tasks(&self, list_id: &str) -> Result<Vec<TodoTask>> {
        let url = self.endpoint(&["me", "todo", "lists", list_id, "tasks"])?;
        self.get_all(url, &format!("tasks from list {}", list_id))
            .await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| MsTodoError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| MsTodoError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_all<T: DeserializeOwned>(&self, first: Url, what: &str) -> Result<Vec<T>> {
        let token = self.token_source.access_token().await?;
        let mut items = Vec::new();
        let mut next = Some(first.to_string());

        while let Some(url) = next.take() {
            debug!("GET {}", url);
            let response = self.client.get(&url).bearer_auth(&token).send().await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(MsTodoError::Unauthorized);
            }
            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(MsTodoError::ApiRequest(format!(
                    "Failed to fetch {}: {} - {}",
                    what, status, body
                )));
            }

            let page: Page<T> = response.json().await?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }
}
