use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use gleaner_common::{
    error::Error,
    notification::Notification,
    retry::RetryPolicy,
    source::SourceProvider,
    state::StateStore,
    task::{HarvestTask, TaskTuple},
};
use tracing::{error, info, warn};

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::{
    kill::{DEFAULT_KILL_POLL_TTL, KillFlagChecker},
    splitter::{HarvestSplitter, SplitterConfig},
};

mod expander;
mod stage;

pub use expander::{EMPTY_TASK_REASON, KILL_DROP_REASON};
pub use stage::{PipelineStage, StageOutcome};

pub const REDEPLOYMENT_DROP_REASON: &str = "Task was dropped because of node redeployment";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    pub worker_count: usize,
    pub kill_poll_ttl: Duration,
    pub retry: RetryPolicy,
    pub splitter: SplitterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 100,
            outbound_capacity: 100,
            worker_count: 10,
            kill_poll_ttl: DEFAULT_KILL_POLL_TTL,
            retry: RetryPolicy::default(),
            splitter: SplitterConfig::default(),
        }
    }
}

pub(crate) struct EngineInner {
    pub store: Arc<dyn StateStore>,
    pub sources: Arc<dyn SourceProvider>,
    pub stages: Vec<Arc<dyn PipelineStage>>,
    pub notifications: mpsc::Sender<Notification>,
    pub splitter: HarvestSplitter,
    pub retry: RetryPolicy,
    pub kill: KillFlagChecker,
    pub deactivating: AtomicBool,
    /// Shared by the worker pool; a mutex-guarded receiver gives a bounded
    /// multi-consumer queue.
    pub inbound_rx: Mutex<mpsc::Receiver<HarvestTask>>,
    /// worker index -> task id currently being expanded.
    pub in_flight: Mutex<HashMap<usize, i64>>,
}

/// Per-node work distribution: a bounded inbound task queue, a fixed worker
/// pool expanding tasks into record tuples, and a bounded outbound queue
/// drained one tuple at a time into the stage chain.
///
/// Backpressure is blocking on both queues: a fast harvester is throttled
/// against a slow downstream stage instead of dropping work.
pub struct WorkEngine {
    inbound_tx: mpsc::Sender<HarvestTask>,
    inner: Arc<EngineInner>,
    workers: Vec<JoinHandle<()>>,
    dispatcher: JoinHandle<()>,
}

impl WorkEngine {
    pub fn start(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        sources: Arc<dyn SourceProvider>,
        stages: Vec<Arc<dyn PipelineStage>>,
        notifications: mpsc::Sender<Notification>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel::<HarvestTask>(config.inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel::<TaskTuple>(config.outbound_capacity);

        let inner = Arc::new(EngineInner {
            kill: KillFlagChecker::new(store.clone(), config.kill_poll_ttl),
            splitter: HarvestSplitter::new(config.splitter.clone(), config.retry.clone()),
            retry: config.retry.clone(),
            store,
            sources,
            stages,
            notifications,
            deactivating: AtomicBool::new(false),
            inbound_rx: Mutex::new(inbound_rx),
            in_flight: Mutex::new(HashMap::new()),
        });

        let workers = (0..config.worker_count.max(1))
            .map(|worker_idx| {
                let inner = inner.clone();
                let outbound_tx = outbound_tx.clone();
                tokio::spawn(async move {
                    worker_loop(inner, worker_idx, outbound_tx).await;
                })
            })
            .collect();
        // The workers hold the only outbound senders; the dispatcher ends
        // once the pool has drained out.
        drop(outbound_tx);

        let dispatcher = {
            let inner = inner.clone();
            tokio::spawn(async move {
                dispatch_loop(inner, outbound_rx).await;
            })
        };

        Self {
            inbound_tx,
            inner,
            workers,
            dispatcher,
        }
    }

    /// Blocking submission: waits for inbound queue capacity.
    pub async fn submit(&self, task: HarvestTask) -> Result<(), Error> {
        self.inbound_tx
            .send(task)
            .await
            .map_err(|_| Error::ChannelComm("inbound task queue is closed".to_string()))
    }

    /// Non-blocking submission; a full queue signals the task source to
    /// retry later.
    pub fn try_submit(&self, task: HarvestTask) -> Result<(), Error> {
        self.inbound_tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => Error::CapacityExceeded(format!(
                "inbound task queue is full, rejecting task {}",
                task.task_id
            )),
            mpsc::error::TrySendError::Closed(_) => {
                Error::ChannelComm("inbound task queue is closed".to_string())
            }
        })
    }

    /// Graceful deactivation: every task still queued inbound and every
    /// task mid-flight in the pool is marked `DROPPED` with a
    /// redeployment reason, so no task is left stuck after a restart.
    pub async fn shutdown(self) {
        info!("engine deactivation requested");
        self.inner.deactivating.store(true, Ordering::SeqCst);
        drop(self.inbound_tx);

        for outcome in futures::future::join_all(self.workers).await {
            if outcome.is_err() {
                warn!("worker terminated abnormally during deactivation");
            }
        }

        // Tasks orphaned by a panicked worker still get dropped.
        let leftover: Vec<i64> = self
            .inner
            .in_flight
            .lock()
            .await
            .drain()
            .map(|(_, task_id)| task_id)
            .collect();
        for task_id in leftover {
            if let Err(e) = self
                .inner
                .store
                .drop_task(task_id, REDEPLOYMENT_DROP_REASON)
                .await
            {
                error!(task_id, error = %e, "failed to drop orphaned task");
            }
        }

        if self.dispatcher.await.is_err() {
            warn!("dispatch loop terminated abnormally during deactivation");
        }
        info!("engine deactivation finished");
    }
}

async fn worker_loop(
    inner: Arc<EngineInner>,
    worker_idx: usize,
    outbound_tx: mpsc::Sender<TaskTuple>,
) {
    loop {
        let task = {
            let mut rx = inner.inbound_rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            break;
        };
        let task_id = task.task_id;

        if inner.deactivating.load(Ordering::SeqCst) {
            if let Err(e) = inner.store.drop_task(task_id, REDEPLOYMENT_DROP_REASON).await {
                error!(task_id, error = %e, "failed to drop queued task on deactivation");
            }
            continue;
        }

        inner.in_flight.lock().await.insert(worker_idx, task_id);
        expander::expand_task(&inner, &task, &outbound_tx).await;
        inner.in_flight.lock().await.remove(&worker_idx);
        inner.kill.forget(task_id).await;
    }
}

async fn dispatch_loop(inner: Arc<EngineInner>, mut outbound_rx: mpsc::Receiver<TaskTuple>) {
    while let Some(tuple) = outbound_rx.recv().await {
        process_tuple(&inner, tuple).await;
    }
}

/// Runs one tuple through the stage chain with emit-with-acknowledgment
/// semantics. Stage errors become error notifications plus an ack; they
/// never unwind into the loop.
async fn process_tuple(inner: &EngineInner, tuple: TaskTuple) {
    let task_id = tuple.task_id;
    let resource = tuple.resource.clone();

    // Late tuples of a settled task are no-ops.
    match inner.store.get_task(task_id).await {
        Ok(Some(task)) if task.state.is_terminal() => return,
        Ok(_) => {}
        Err(e) => {
            warn!(task_id, error = %e, "state lookup failed, skipping tuple");
            return;
        }
    }

    // A kill can land after expansion, while the queued tuples drain.
    match inner.kill.has_kill_flag(task_id).await {
        Ok(true) => {
            info!(task_id, "kill flag observed while draining, dropping task");
            if let Err(e) = inner.store.drop_task(task_id, KILL_DROP_REASON).await {
                error!(task_id, error = %e, "failed to drop killed task");
            }
            inner.kill.forget(task_id).await;
            return;
        }
        Ok(false) => {}
        Err(e) => {
            warn!(task_id, error = %e, "kill flag lookup failed, skipping tuple");
            return;
        }
    }

    let mut current = tuple;
    for stage in &inner.stages {
        match stage.process(current).await {
            Ok(StageOutcome::Emit(next)) => current = next,
            Ok(StageOutcome::Ack) => break,
            Ok(StageOutcome::Fail(reason)) => {
                warn!(task_id, resource = %resource, stage = stage.name(), reason = %reason,
                    "stage failed tuple, handing back for redelivery");
                if inner
                    .notifications
                    .send(Notification::requeued(task_id, &resource, reason))
                    .await
                    .is_err()
                {
                    warn!(task_id, "notification channel closed, requeue report lost");
                }
                return;
            }
            // Task-fatal errors abort the whole task, not just the record.
            Err(e) if e.is_task_fatal() => {
                let reason = match e {
                    Error::Cancelled(reason) => reason,
                    other => format!("Task was dropped because of: {other}"),
                };
                warn!(task_id, resource = %resource, stage = stage.name(), reason = %reason,
                    "stage raised a task-fatal error");
                if let Err(db_err) = inner.store.drop_task(task_id, &reason).await {
                    error!(task_id, error = %db_err, "failed to drop task");
                }
                return;
            }
            Err(e) => {
                if let Err(db_err) = inner
                    .store
                    .increment_error(task_id, &e.to_string(), &resource)
                    .await
                {
                    error!(task_id, error = %db_err, "failed to record tuple error");
                }
                if inner
                    .notifications
                    .send(Notification::error(
                        task_id,
                        &resource,
                        e.to_string(),
                        stage.name(),
                    ))
                    .await
                    .is_err()
                {
                    warn!(task_id, "notification channel closed, error report lost");
                }
                maybe_finish(inner, task_id).await;
                return;
            }
        }
    }

    if inner
        .notifications
        .send(Notification::success(task_id, &resource))
        .await
        .is_err()
    {
        warn!(task_id, "notification channel closed, success report lost");
    }
    if let Err(e) = inner.store.increment_processed(task_id).await {
        error!(task_id, error = %e, "failed to record tuple progress");
    }
    maybe_finish(inner, task_id).await;
}

/// Marks a task processed once every expected record is accounted for,
/// either as progress or as a recorded error.
pub(crate) async fn maybe_finish(inner: &EngineInner, task_id: i64) {
    let report = match inner.store.task_report(task_id).await {
        Ok(Some(report)) => report,
        Ok(None) => return,
        Err(e) => {
            warn!(task_id, error = %e, "completion check failed");
            return;
        }
    };
    if report.state.is_terminal() {
        return;
    }
    let Some(expected) = report.expected_record_count else {
        return;
    };
    if report.processed_count + report.error_count >= expected {
        info!(
            task_id,
            processed = report.processed_count,
            errors = report.error_count,
            "all expected records accounted for, finishing task"
        );
        if let Err(e) = inner.store.finish_task(task_id).await {
            error!(task_id, error = %e, "failed to finish task");
        }
    }
}
