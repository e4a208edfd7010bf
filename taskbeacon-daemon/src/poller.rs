//! Background poll loop for entities.
//!
//! This module implements the `Poller` which drives periodic updates of the
//! entities created for each loaded config entry. It handles:
//!
//! - One tokio task per entity, updating once per scan interval
//! - An immediate first update when polling starts
//! - Tracking poll state (last poll time, poll count)
//! - Per-entry shutdown signaling, so unloading one entry leaves the rest running
//!
//! # Example
//!
//! ```no_run
//! use taskbeacon_daemon::poller::Poller;
//! use taskbeacon_core::{Entity, EntryId};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(entity: Arc<dyn Entity>) {
//! let poller = Poller::new();
//! poller
//!     .start(EntryId::new("personal"), entity, Duration::from_secs(60))
//!     .await;
//!
//! // Later: stop polling this entry
//! poller.stop(&EntryId::new("personal")).await;
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskbeacon_core::{Entity, EntryId};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// ============================================================================
// Poll State Types
// ============================================================================

/// Per-entity poll tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollState {
    /// Entity unique id
    pub unique_id: String,
    /// Entry the entity belongs to
    pub entry_id: EntryId,
    /// Interval between scheduled polls, in seconds
    pub interval_secs: u64,
    /// Time the last update finished
    pub last_poll: Option<DateTime<Utc>>,
    /// Number of updates run since polling started
    pub polls: u64,
}

struct EntryTasks {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

// ============================================================================
// Poller
// ============================================================================

/// Runs scheduled entity updates.
#[derive(Default)]
pub struct Poller {
    tasks: Mutex<HashMap<EntryId, EntryTasks>>,
    state: Arc<RwLock<HashMap<String, PollState>>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling an entity on behalf of an entry.
    ///
    /// The first update runs immediately, then `period` after the previous
    /// update finished.
    pub async fn start(&self, entry_id: EntryId, entity: Arc<dyn Entity>, period: Duration) {
        let unique_id = entity.unique_id();

        self.state.write().await.insert(
            unique_id.clone(),
            PollState {
                unique_id: unique_id.clone(),
                entry_id: entry_id.clone(),
                interval_secs: period.as_secs(),
                last_poll: None,
                polls: 0,
            },
        );

        let mut tasks = self.tasks.lock().await;
        let entry_tasks = tasks.entry(entry_id.clone()).or_insert_with(|| {
            let (shutdown_tx, _) = broadcast::channel(1);
            EntryTasks {
                shutdown_tx,
                handles: Vec::new(),
            }
        });

        let shutdown_rx = entry_tasks.shutdown_tx.subscribe();
        let handle = Self::spawn_poll_task(
            unique_id.clone(),
            entity,
            period,
            Arc::clone(&self.state),
            shutdown_rx,
        );
        entry_tasks.handles.push(handle);

        info!(
            "Polling '{}' for entry '{}' every {:?}",
            unique_id, entry_id, period
        );
    }

    fn spawn_poll_task(
        unique_id: String,
        entity: Arc<dyn Entity>,
        period: Duration,
        state: Arc<RwLock<HashMap<String, PollState>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Updating '{}'", unique_id);
                        entity.update().await;

                        // Count the next period from the end of this update, so two
                        // update starts are never closer together than `period`.
                        ticker.reset();

                        let mut state_lock = state.write().await;
                        if let Some(poll_state) = state_lock.get_mut(&unique_id) {
                            poll_state.last_poll = Some(Utc::now());
                            poll_state.polls += 1;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Poll task for '{}' received shutdown signal", unique_id);
                        break;
                    }
                }
            }

            state.write().await.remove(&unique_id);
            debug!("Poll task for '{}' stopped", unique_id);
        })
    }

    /// Stop every poll task of an entry and wait for them to exit.
    ///
    /// Returns `false` if the entry had no poll tasks.
    pub async fn stop(&self, entry_id: &EntryId) -> bool {
        let entry_tasks = match self.tasks.lock().await.remove(entry_id) {
            Some(entry_tasks) => entry_tasks,
            None => return false,
        };

        let _ = entry_tasks.shutdown_tx.send(());
        for handle in entry_tasks.handles {
            if let Err(e) = handle.await {
                warn!("Poll task for entry '{}' ended abnormally: {}", entry_id, e);
            }
        }

        info!("Stopped polling entry '{}'", entry_id);
        true
    }

    /// Stop all poll tasks.
    pub async fn stop_all(&self) {
        let entry_ids: Vec<EntryId> = self.tasks.lock().await.keys().cloned().collect();
        for entry_id in entry_ids {
            self.stop(&entry_id).await;
        }
    }

    /// Whether an entry has running poll tasks.
    pub async fn is_polling(&self, entry_id: &EntryId) -> bool {
        self.tasks.lock().await.contains_key(entry_id)
    }

    /// Poll state of all running entities.
    pub async fn states(&self) -> HashMap<String, PollState> {
        self.state.read().await.clone()
    }

    /// Poll state of one entity.
    pub async fn state(&self, unique_id: &str) -> Option<PollState> {
        self.state.read().await.get(unique_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskbeacon_core::Throttle;

    struct CountingEntity {
        id: &'static str,
        updates: AtomicU32,
    }

    impl CountingEntity {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                updates: AtomicU32::new(0),
            })
        }

        fn updates(&self) -> u32 {
            self.updates.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Entity for CountingEntity {
        fn unique_id(&self) -> String {
            self.id.to_string()
        }

        fn name(&self) -> &str {
            "Counting"
        }

        fn state(&self) -> Option<String> {
            Some(self.updates().to_string())
        }

        async fn update(&self) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_update_is_immediate() {
        let poller = Poller::new();
        let entity = CountingEntity::new("one");

        poller
            .start(EntryId::new("e1"), entity.clone(), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(entity.updates(), 1);
        let state = poller.state("one").await.unwrap();
        assert_eq!(state.polls, 1);
        assert_eq!(state.interval_secs, 60);
        assert!(state.last_poll.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_follow_interval() {
        let poller = Poller::new();
        let entity = CountingEntity::new("one");

        poller
            .start(EntryId::new("e1"), entity.clone(), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(entity.updates(), 3);
    }

    /// Entity whose data source is throttled to the poll period and whose
    /// updates take a varying time before reaching the throttle.
    struct LaggingEntity {
        throttle: Throttle,
        lags: std::sync::Mutex<VecDeque<Duration>>,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl Entity for LaggingEntity {
        fn unique_id(&self) -> String {
            "lagging".to_string()
        }

        fn name(&self) -> &str {
            "Lagging"
        }

        fn state(&self) -> Option<String> {
            None
        }

        async fn update(&self) {
            let lag = self.lags.lock().unwrap().pop_front().unwrap_or_default();
            tokio::time::sleep(lag).await;
            if self.throttle.try_acquire() {
                self.fetches.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_update_does_not_get_next_poll_throttled() {
        let poller = Poller::new();
        let entity = Arc::new(LaggingEntity {
            throttle: Throttle::new(Duration::from_secs(60)),
            lags: std::sync::Mutex::new(VecDeque::from([
                Duration::from_secs(2),
                Duration::ZERO,
                Duration::ZERO,
            ])),
            fetches: AtomicU32::new(0),
        });

        poller
            .start(EntryId::new("e1"), entity.clone(), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_secs(125)).await;

        // Updates reach the throttle at 2s, 62s and 122s.
        assert_eq!(entity.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(poller.state("lagging").await.unwrap().polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_updates() {
        let poller = Poller::new();
        let entity = CountingEntity::new("one");
        let entry_id = EntryId::new("e1");

        poller
            .start(entry_id.clone(), entity.clone(), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(poller.is_polling(&entry_id).await);

        assert!(poller.stop(&entry_id).await);
        assert!(!poller.is_polling(&entry_id).await);
        assert!(poller.state("one").await.is_none());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(entity.updates(), 1);

        assert!(!poller.stop(&entry_id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_one_entry_keeps_others() {
        let poller = Poller::new();
        let first = CountingEntity::new("first");
        let second = CountingEntity::new("second");

        poller
            .start(EntryId::new("e1"), first.clone(), Duration::from_secs(60))
            .await;
        poller
            .start(EntryId::new("e2"), second.clone(), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        poller.stop(&EntryId::new("e1")).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(first.updates(), 1);
        assert_eq!(second.updates(), 2);
        assert_eq!(poller.states().await.len(), 1);

        poller.stop_all().await;
        assert!(poller.states().await.is_empty());
    }
}
