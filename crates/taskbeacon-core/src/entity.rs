//! The entity contract.
//!
//! An entity is a named object with a state string that the host refreshes
//! by calling [`Entity::update`] on a schedule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier, unique across all entries.
    fn unique_id(&self) -> String;

    /// Display name.
    fn name(&self) -> &str;

    /// Current state, or `None` before the first successful update.
    fn state(&self) -> Option<String>;

    /// Extra state attributes.
    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    /// Refresh the state from the backing data source.
    async fn update(&self);
}

/// Point-in-time view of an entity, suitable for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub unique_id: String,
    pub name: String,
    pub state: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl EntitySnapshot {
    pub fn capture(entity: &dyn Entity) -> Self {
        Self {
            unique_id: entity.unique_id(),
            name: entity.name().to_string(),
            state: entity.state(),
            attributes: entity.attributes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CounterEntity {
        count: Mutex<u32>,
    }

    #[async_trait]
    impl Entity for CounterEntity {
        fn unique_id(&self) -> String {
            "counter".to_string()
        }

        fn name(&self) -> &str {
            "Counter"
        }

        fn state(&self) -> Option<String> {
            Some(self.count.lock().unwrap().to_string())
        }

        async fn update(&self) {
            *self.count.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn test_snapshot_reflects_updates() {
        let entity = CounterEntity {
            count: Mutex::new(0),
        };
        entity.update().await;

        let snapshot = EntitySnapshot::capture(&entity);
        assert_eq!(snapshot.unique_id, "counter");
        assert_eq!(snapshot.name, "Counter");
        assert_eq!(snapshot.state.as_deref(), Some("1"));
        assert!(snapshot.attributes.is_empty());
    }
}
