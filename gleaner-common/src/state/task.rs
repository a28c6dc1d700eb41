use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Error,
    task::{HarvestTask, TaskReport, TaskState},
};

/// Per-task CRUD over the partitioned store (collaborator).
///
/// The store must honor the terminal-state invariant: once a task has
/// reached `PROCESSED`, `DROPPED` or `ERROR`, later progress/state writes
/// are silently ignored (late writers no-op). Increment operations are
/// upserts tolerant of at-least-once redelivery: replays may over-count,
/// never corrupt.
#[async_trait]
pub trait TaskInfoStore: Send + Sync + Debug + 'static {
    async fn create_task(&self, task: &HarvestTask) -> Result<(), Error>;

    async fn get_task(&self, task_id: i64) -> Result<Option<HarvestTask>, Error>;

    /// Updates the task state, with an optional human-readable reason.
    /// No-ops when the stored state is already terminal.
    async fn update_state(
        &self,
        task_id: i64,
        new_state: TaskState,
        reason: Option<String>,
    ) -> Result<(), Error>;

    /// Records the total record count derived by the splitter.
    async fn set_expected_size(&self, task_id: i64, expected: u64) -> Result<(), Error>;

    /// Increments the processed-record counter and returns the new total.
    async fn increment_processed(&self, task_id: i64) -> Result<u64, Error>;

    /// Records one error occurrence, grouped by message into an error type.
    async fn increment_error(
        &self,
        task_id: i64,
        message: &str,
        resource: &str,
    ) -> Result<(), Error>;

    /// Per-type error counters for the task, in stable key order.
    async fn error_report(&self, task_id: i64) -> Result<Vec<ErrorTypeReport>, Error>;

    /// Progress/error summary, or `None` for an unknown task.
    async fn task_report(&self, task_id: i64) -> Result<Option<TaskReport>, Error>;

    async fn set_kill_flag(&self, task_id: i64) -> Result<(), Error>;

    async fn has_kill_flag(&self, task_id: i64) -> Result<bool, Error>;

    async fn remove_kill_flag(&self, task_id: i64) -> Result<(), Error>;

    /// Drops the task with the given reason and clears its kill flag.
    async fn drop_task(&self, task_id: i64, reason: &str) -> Result<(), Error> {
        self.update_state(task_id, TaskState::Dropped, Some(reason.to_string()))
            .await?;
        self.remove_kill_flag(task_id).await
    }

    /// Marks the task fully processed and clears its kill flag.
    async fn finish_task(&self, task_id: i64) -> Result<(), Error> {
        self.update_state(task_id, TaskState::Processed, None).await?;
        self.remove_kill_flag(task_id).await
    }
}

/// One aggregated error type for a task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorTypeReport {
    pub error_type: Uuid,
    pub message: String,
    pub occurrences: u64,
    /// An arbitrary offending resource, kept for operator diagnosis.
    pub sample_resource: Option<String>,
}
