use std::sync::atomic::Ordering;

use gleaner_common::{
    error::Error,
    param_keys,
    retry::run_retryable,
    task::{HarvestTask, Revision, TaskState, TaskTuple},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{EngineInner, REDEPLOYMENT_DROP_REASON, maybe_finish};

pub const EMPTY_TASK_REASON: &str = "The task with the submitted parameters is empty";
pub const KILL_DROP_REASON: &str = "Task was dropped by external cancellation request";

/// Expands one task into record tuples, catching every failure mode: any
/// error short of a successful expansion settles the task as `DROPPED` with
/// a reason, so a task can never stay `CURRENTLY_PROCESSING` forever.
pub(super) async fn expand_task(
    inner: &EngineInner,
    task: &HarvestTask,
    outbound_tx: &mpsc::Sender<TaskTuple>,
) {
    let task_id = task.task_id;
    if let Err(e) = inner
        .store
        .update_state(task_id, TaskState::CurrentlyProcessing, None)
        .await
    {
        error!(task_id, error = %e, "failed to mark task as processing, dropping it");
        drop_with(inner, task_id, &format!("Task was dropped because of: {e}")).await;
        return;
    }

    match run(inner, task, outbound_tx).await {
        Ok(emitted) if emitted == 0 => {
            info!(task_id, "task expanded to zero records");
            drop_with(inner, task_id, EMPTY_TASK_REASON).await;
        }
        Ok(emitted) => {
            debug!(task_id, emitted, "task expansion finished");
        }
        Err(Error::Cancelled(reason)) => {
            info!(task_id, reason = %reason, "task expansion cancelled");
            drop_with(inner, task_id, &reason).await;
        }
        Err(e) => {
            error!(task_id, error = %e, "task expansion failed");
            drop_with(inner, task_id, &format!("Task was dropped because of: {e}")).await;
        }
    }
}

async fn drop_with(inner: &EngineInner, task_id: i64, reason: &str) {
    if let Err(e) = inner.store.drop_task(task_id, reason).await {
        error!(task_id, error = %e, "failed to drop task");
    }
}

async fn run(
    inner: &EngineInner,
    task: &HarvestTask,
    outbound_tx: &mpsc::Sender<TaskTuple>,
) -> Result<u64, Error> {
    let task_id = task.task_id;
    if inner.kill.has_kill_flag(task_id).await? {
        return Err(Error::Cancelled(KILL_DROP_REASON.to_string()));
    }

    let emitted = if task.is_harvesting() {
        expand_harvesting(inner, task, outbound_tx).await?
    } else {
        expand_input_data(inner, task, outbound_tx).await?
    };

    if emitted > 0 {
        inner.store.set_expected_size(task_id, emitted).await?;
        // The dispatch loop may already have drained every tuple by the
        // time the total is known.
        maybe_finish(inner, task_id).await;
    }
    Ok(emitted)
}

/// Splits the harvest into chunks and lists identifiers chunk by chunk,
/// emitting one tuple per live, non-excluded record. The kill flag and the
/// deactivation flag are re-checked between chunks so a cancelled task stops
/// within one chunk of work.
async fn expand_harvesting(
    inner: &EngineInner,
    task: &HarvestTask,
    outbound_tx: &mpsc::Sender<TaskTuple>,
) -> Result<u64, Error> {
    let task_id = task.task_id;
    let endpoint = task.input_data.first().ok_or_else(|| {
        Error::SplitterFatal(format!("harvesting task {task_id} carries no repository URL"))
    })?;
    let source = inner.sources.provide(endpoint)?;
    let plan = inner.splitter.plan(task, source.as_ref(), &inner.kill).await?;

    let excluded_sets = task
        .harvesting_details
        .as_ref()
        .map(|d| d.excluded_sets.clone())
        .unwrap_or_default();
    let base = TaskTuple::from_task(task, endpoint.clone());

    let mut emitted: u64 = 0;
    for chunk in plan.chunks() {
        if inner.deactivating.load(Ordering::SeqCst) {
            return Err(Error::Cancelled(REDEPLOYMENT_DROP_REASON.to_string()));
        }
        if inner.kill.has_kill_flag(task_id).await? {
            return Err(Error::Cancelled(KILL_DROP_REASON.to_string()));
        }

        let headers = run_retryable(&inner.retry, &inner.kill, task_id, || {
            source.list_identifiers(&chunk)
        })
        .await?;
        debug!(
            task_id,
            schema = %chunk.schema,
            from = %chunk.from,
            until = %chunk.until,
            headers = headers.len(),
            "chunk listed"
        );

        for header in headers {
            if header.deleted || header.in_any_set(&excluded_sets) {
                continue;
            }
            let mut tuple = base.for_record(&header.identifier);
            tuple.add_parameter(param_keys::RECORD_LOCAL_IDENTIFIER, &header.identifier);
            tuple.add_parameter(param_keys::SCHEMA_NAME, &chunk.schema);
            tuple.add_parameter(param_keys::TASK_INPUT_DATA, endpoint.clone());
            // Output revision, stamped when the task names a provider.
            if let Some(provider) = task.parameter(param_keys::PROVIDER_ID) {
                tuple.revision = Some(Revision {
                    name: task.name.clone(),
                    provider: provider.to_string(),
                    creation_timestamp: header.datestamp,
                    deleted: header.deleted,
                });
            }
            outbound_tx.send(tuple).await.map_err(|_| {
                Error::ChannelComm("outbound tuple queue is closed".to_string())
            })?;
            emitted += 1;
        }
    }
    Ok(emitted)
}

/// Non-harvesting tasks fan out one tuple per input resource URL.
async fn expand_input_data(
    inner: &EngineInner,
    task: &HarvestTask,
    outbound_tx: &mpsc::Sender<TaskTuple>,
) -> Result<u64, Error> {
    let mut emitted: u64 = 0;
    for url in &task.input_data {
        if inner.deactivating.load(Ordering::SeqCst) {
            return Err(Error::Cancelled(REDEPLOYMENT_DROP_REASON.to_string()));
        }
        let mut tuple = TaskTuple::from_task(task, url.clone());
        tuple.add_parameter(param_keys::TASK_INPUT_DATA, url.clone());
        outbound_tx.send(tuple).await.map_err(|_| {
            Error::ChannelComm("outbound tuple queue is closed".to_string())
        })?;
        emitted += 1;
    }
    Ok(emitted)
}
