use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use taskbeacon_core::{Entity, EntryId};

use crate::data::ImportantTasksData;

/// Display name of the sensor.
pub const SENSOR_NAME: &str = "Microsoft To Do Important Tasks";

/// Sensor whose state is the newline-joined list of important open tasks.
pub struct ImportantTasksSensor {
    entry_id: EntryId,
    data: Arc<ImportantTasksData>,
}

impl ImportantTasksSensor {
    pub fn new(entry_id: EntryId, data: Arc<ImportantTasksData>) -> Self {
        Self { entry_id, data }
    }

    pub fn data(&self) -> &Arc<ImportantTasksData> {
        &self.data
    }
}

#[async_trait]
impl Entity for ImportantTasksSensor {
    fn unique_id(&self) -> String {
        format!("{}_important_tasks", self.entry_id)
    }

    fn name(&self) -> &str {
        SENSOR_NAME
    }

    fn state(&self) -> Option<String> {
        self.data.summary()
    }

    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut attributes = HashMap::new();
        if let Some(latest) = self.data.latest() {
            attributes.insert("important_count".to_string(), json!(latest.titles.len()));
            attributes.insert(
                "last_updated".to_string(),
                json!(latest.updated_at.to_rfc3339()),
            );
        }
        attributes
    }

    async fn update(&self) {
        self.data.update().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MsTodoClient;
    use taskbeacon_oauth::StaticTokenSource;

    #[test]
    fn test_sensor_basics_before_first_update() {
        let client = MsTodoClient::new(Arc::new(StaticTokenSource::new("token")));
        let sensor = ImportantTasksSensor::new(
            EntryId::new("entry-1"),
            Arc::new(ImportantTasksData::new(client)),
        );

        assert_eq!(sensor.name(), "Microsoft To Do Important Tasks");
        assert_eq!(sensor.unique_id(), "entry-1_important_tasks");
        assert!(sensor.state().is_none());
        assert!(sensor.attributes().is_empty());
    }
}
