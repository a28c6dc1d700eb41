use async_trait::async_trait;
use gleaner_common::{
    error::{Error, error_type_key},
    state::{ErrorTypeReport, TaskInfoStore},
    task::{HarvestTask, TaskReport, TaskState},
};
use tracing::debug;

use crate::db::{ERROR_LOG_COLLECTION, ErrorOccurrence, ErrorTypeRow, MemoryStateStore, TaskRow};

#[async_trait]
impl TaskInfoStore for MemoryStateStore {
    async fn create_task(&self, task: &HarvestTask) -> Result<(), Error> {
        let mut tasks = self.tasks.write().await;
        // Redelivered submissions keep the existing row.
        tasks.entry(task.task_id).or_insert_with(|| TaskRow {
            task: task.clone(),
            state_reason: None,
            processed_count: 0,
        });
        Ok(())
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<HarvestTask>, Error> {
        Ok(self.tasks.read().await.get(&task_id).map(|r| r.task.clone()))
    }

    async fn update_state(
        &self,
        task_id: i64,
        new_state: TaskState,
        reason: Option<String>,
    ) -> Result<(), Error> {
        let mut tasks = self.tasks.write().await;
        let row = tasks.get_mut(&task_id).ok_or_else(|| Error::NotFound {
            resource_type: "HarvestTask".to_string(),
            resource_id: task_id.to_string(),
        })?;

        if row.task.state.is_terminal() || row.task.state == new_state {
            // Late or replayed writers no-op once the state has settled.
            debug!(task_id, state = %row.task.state, "ignoring state write on settled task");
            return Ok(());
        }
        if !row.task.state.can_transition_to(new_state) {
            return Err(Error::StateTransition(format!(
                "task {task_id}: {} -> {new_state} is not a legal transition",
                row.task.state
            )));
        }
        row.task.state = new_state;
        if reason.is_some() {
            row.state_reason = reason;
        }
        Ok(())
    }

    async fn set_expected_size(&self, task_id: i64, expected: u64) -> Result<(), Error> {
        let mut tasks = self.tasks.write().await;
        if let Some(row) = tasks.get_mut(&task_id) {
            if !row.task.state.is_terminal() {
                row.task.expected_record_count = Some(expected);
            }
        }
        Ok(())
    }

    async fn increment_processed(&self, task_id: i64) -> Result<u64, Error> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task_id) {
            Some(row) if !row.task.state.is_terminal() => {
                row.processed_count += 1;
                Ok(row.processed_count)
            }
            Some(row) => Ok(row.processed_count),
            None => Ok(0),
        }
    }

    async fn increment_error(
        &self,
        task_id: i64,
        message: &str,
        resource: &str,
    ) -> Result<(), Error> {
        {
            let tasks = self.tasks.read().await;
            if let Some(row) = tasks.get(&task_id) {
                if row.task.state.is_terminal() {
                    return Ok(());
                }
            }
        }

        let key = error_type_key(message);
        {
            let mut types = self.error_types.write().await;
            let entry = types
                .entry(task_id)
                .or_default()
                .entry(key)
                .or_insert_with(|| ErrorTypeRow {
                    message: message.to_string(),
                    occurrences: 0,
                    sample_resource: None,
                });
            entry.occurrences += 1;
            if entry.sample_resource.is_none() {
                entry.sample_resource = Some(resource.to_string());
            }
        }

        // The raw occurrence log is cardinality-sensitive: writes go through
        // the allocator so no single task grows one unbounded partition.
        let object_id = task_id.to_string();
        let bucket = self
            .error_allocator
            .assign_and_count(self, ERROR_LOG_COLLECTION, &object_id)
            .await?;
        self.error_log
            .write()
            .await
            .entry((object_id, bucket.bucket_id))
            .or_default()
            .push(ErrorOccurrence {
                resource: resource.to_string(),
                message: message.to_string(),
            });
        Ok(())
    }

    async fn error_report(&self, task_id: i64) -> Result<Vec<ErrorTypeReport>, Error> {
        let types = self.error_types.read().await;
        Ok(types
            .get(&task_id)
            .map(|by_type| {
                by_type
                    .iter()
                    .map(|(error_type, row)| ErrorTypeReport {
                        error_type: *error_type,
                        message: row.message.clone(),
                        occurrences: row.occurrences,
                        sample_resource: row.sample_resource.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn task_report(&self, task_id: i64) -> Result<Option<TaskReport>, Error> {
        let tasks = self.tasks.read().await;
        let Some(row) = tasks.get(&task_id) else {
            return Ok(None);
        };
        let error_count = self
            .error_types
            .read()
            .await
            .get(&task_id)
            .map(|by_type| by_type.values().map(|r| r.occurrences).sum())
            .unwrap_or(0);
        Ok(Some(TaskReport {
            task_id,
            state: row.task.state,
            state_reason: row.state_reason.clone(),
            expected_record_count: row.task.expected_record_count,
            processed_count: row.processed_count,
            error_count,
        }))
    }

    async fn set_kill_flag(&self, task_id: i64) -> Result<(), Error> {
        self.kill_flags.write().await.insert(task_id);
        Ok(())
    }

    async fn has_kill_flag(&self, task_id: i64) -> Result<bool, Error> {
        Ok(self.kill_flags.read().await.contains(&task_id))
    }

    async fn remove_kill_flag(&self, task_id: i64) -> Result<(), Error> {
        self.kill_flags.write().await.remove(&task_id);
        Ok(())
    }
}
