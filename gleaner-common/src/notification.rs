use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Per-record outcome carried on the notification channel, consumed by
/// reporting/UI layers outside this core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub task_id: i64,
    pub resource: String,
    pub state: RecordState,
    pub message: String,
    /// Free-form detail, e.g. a stage name or a truncated stack of causes.
    pub detail: String,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Success,
    Error,
    /// The record was handed back for redelivery by the upstream queue.
    Queued,
}

impl Notification {
    pub fn success(task_id: i64, resource: impl Into<String>) -> Self {
        Self {
            task_id,
            resource: resource.into(),
            state: RecordState::Success,
            message: String::new(),
            detail: String::new(),
        }
    }

    pub fn error(
        task_id: i64,
        resource: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            resource: resource.into(),
            state: RecordState::Error,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn requeued(task_id: i64, resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id,
            resource: resource.into(),
            state: RecordState::Queued,
            message: message.into(),
            detail: String::new(),
        }
    }
}
