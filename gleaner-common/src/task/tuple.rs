use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{harvest::HarvestingDetails, task::HarvestTask};

/// One record-level unit of work descending from a task.
///
/// Tuples are owned value objects: `Clone` yields a fully independent deep
/// copy, so one tuple's descent through the pipeline never aliases a
/// sibling's parameters or harvesting details.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskTuple {
    pub task_id: i64,
    pub task_name: String,
    /// Target resource reference, e.g. one record URL or OAI identifier.
    pub resource: String,
    pub parameters: HashMap<String, String>,
    pub revision: Option<Revision>,
    pub harvesting_details: Option<HarvestingDetails>,
}

impl TaskTuple {
    /// Builds the base tuple for a task, before record-level fan-out.
    pub fn from_task(task: &HarvestTask, resource: impl Into<String>) -> Self {
        Self {
            task_id: task.task_id,
            task_name: task.name.clone(),
            resource: resource.into(),
            parameters: task.parameters.clone(),
            revision: None,
            harvesting_details: task.harvesting_details.clone(),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Deep copy re-targeted at a single record.
    pub fn for_record(&self, resource: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.resource = resource.into();
        copy
    }
}

/// Optional revision descriptor attached to emitted tuples.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    pub name: String,
    pub provider: String,
    pub creation_timestamp: DateTime<Utc>,
    pub deleted: bool,
}
