//! Throttled data source behind the important-tasks sensor.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::Duration;
use taskbeacon_core::Throttle;
use tracing::{debug, error, info, warn};

use crate::summary::{important_titles, summarize};
use crate::{MsTodoClient, MsTodoError, Result, TaskList};

/// Polls closer together than this are skipped.
pub const MIN_TIME_BETWEEN_UPDATES: Duration = Duration::from_secs(60);

/// Result of one [`ImportantTasksData::update`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The state was recomputed.
    Updated { important: usize },
    /// Called inside the throttle window; nothing was requested.
    Throttled,
    /// The lists call failed; the previous state is kept.
    Failed(String),
}

/// Outcome of the last successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportantTasks {
    pub titles: Vec<String>,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

impl ImportantTasks {
    fn new(titles: Vec<String>) -> Self {
        let summary = summarize(&titles);
        Self {
            titles,
            summary,
            updated_at: Utc::now(),
        }
    }
}

/// Fetches task lists and tasks and keeps the latest important-tasks summary.
pub struct ImportantTasksData {
    client: MsTodoClient,
    throttle: Throttle,
    latest: RwLock<Option<ImportantTasks>>,
}

impl ImportantTasksData {
    pub fn new(client: MsTodoClient) -> Self {
        Self::with_min_interval(client, MIN_TIME_BETWEEN_UPDATES)
    }

    pub fn with_min_interval(client: MsTodoClient, min_interval: Duration) -> Self {
        Self {
            client,
            throttle: Throttle::new(min_interval),
            latest: RwLock::new(None),
        }
    }

    /// Latest summary, `None` until the first successful poll.
    pub fn latest(&self) -> Option<ImportantTasks> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> Option<String> {
        self.latest().map(|latest| latest.summary)
    }

    /// Poll Microsoft To Do unless a poll ran within the throttle interval.
    pub async fn update(&self) -> PollOutcome {
        if !self.throttle.try_acquire() {
            debug!(
                "Skipping poll, next allowed in {:?}",
                self.throttle.remaining()
            );
            return PollOutcome::Throttled;
        }

        match self.poll().await {
            Ok(result) => {
                let important = result.titles.len();
                info!("Found {} important task(s)", important);
                *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(result);
                PollOutcome::Updated { important }
            }
            Err(e) => {
                error!("Error fetching tasks: {}", e);
                PollOutcome::Failed(e.to_string())
            }
        }
    }

    async fn poll(&self) -> Result<ImportantTasks> {
        let lists = self.fetch_lists().await?;

        let mut titles = Vec::new();
        for list in &lists {
            match self.client.fetch_tasks(&list.id).await {
                Ok(tasks) => titles.extend(important_titles(&tasks)),
                Err(e) => warn!("Skipping list '{}': {}", list.display_name, e),
            }
        }

        Ok(ImportantTasks::new(titles))
    }

    /// Fetch lists, refreshing the token once if Graph rejects it.
    async fn fetch_lists(&self) -> Result<Vec<TaskList>> {
        match self.client.fetch_task_lists().await {
            Err(MsTodoError::Unauthorized) => {
                info!("Access token rejected, refreshing");
                self.client.token_source().refresh().await?;
                self.client.fetch_task_lists().await
            }
            other => other,
        }
    }
}
