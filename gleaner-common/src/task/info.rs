use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::harvest::HarvestingDetails;

/// A unit of submitted work, e.g. "harvest dataset X into topology Y".
///
/// Created on submission by the task source; mutated by workers as sub-tasks
/// complete. Once the state is terminal the record is immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarvestTask {
    /// Process-wide unique, numeric (assigned by the task source).
    pub task_id: i64,
    pub name: String,
    /// Target topology / pipeline this task is routed to.
    pub topology: String,
    pub parameters: HashMap<String, String>,
    /// Resource URLs expanded one-per-tuple for non-harvesting tasks.
    pub input_data: Vec<String>,
    pub harvesting_details: Option<HarvestingDetails>,
    /// Filled in after splitting, when the total record count is known.
    pub expected_record_count: Option<u64>,
    pub state: TaskState,
}

impl HarvestTask {
    pub fn new(task_id: i64, name: impl Into<String>, topology: impl Into<String>) -> Self {
        Self {
            task_id,
            name: name.into(),
            topology: topology.into(),
            parameters: HashMap::new(),
            input_data: Vec::new(),
            harvesting_details: None,
            expected_record_count: None,
            state: TaskState::Pending,
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn is_harvesting(&self) -> bool {
        self.harvesting_details.is_some()
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    CurrentlyProcessing,
    Processed,
    Dropped,
    Error,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Processed | TaskState::Dropped | TaskState::Error
        )
    }

    /// Pure dispatch over the state machine:
    /// `PENDING -> CURRENTLY_PROCESSING -> {PROCESSED | DROPPED | ERROR}`,
    /// with `DROPPED` reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskState::Pending => false,
            TaskState::CurrentlyProcessing => *self == TaskState::Pending,
            TaskState::Processed | TaskState::Error => *self == TaskState::CurrentlyProcessing,
            TaskState::Dropped => true,
        }
    }
}

/// Operator-facing progress view of a single task.
///
/// Exposes both the processed count and the per-type error total so that
/// "completed with N recoverable failures" can be told apart from
/// "failed outright".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: i64,
    pub state: TaskState,
    pub state_reason: Option<String>,
    pub expected_record_count: Option<u64>,
    pub processed_count: u64,
    pub error_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_round_trips_as_screaming_snake_case() {
        assert_eq!(TaskState::CurrentlyProcessing.to_string(), "CURRENTLY_PROCESSING");
        assert_eq!(
            TaskState::from_str("DROPPED").unwrap(),
            TaskState::Dropped
        );
    }

    #[test]
    fn pending_task_can_be_dropped_directly() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Dropped));
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        for terminal in [TaskState::Processed, TaskState::Dropped, TaskState::Error] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(TaskState::CurrentlyProcessing));
            assert!(!terminal.can_transition_to(TaskState::Dropped));
        }
    }

    #[test]
    fn processed_requires_currently_processing() {
        assert!(!TaskState::Pending.can_transition_to(TaskState::Processed));
        assert!(TaskState::CurrentlyProcessing.can_transition_to(TaskState::Processed));
    }
}
