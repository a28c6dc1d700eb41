use async_trait::async_trait;
use gleaner_common::{error::Error, task::TaskTuple};

/// One stage in the processing chain.
///
/// A stage never lets an error escape the chain uncaught: the dispatch loop
/// converts a record-level `Err` into a structured error notification plus
/// an ack, and a task-fatal `Err` into a task drop, so a bad record cannot
/// take down the worker pool serving unrelated tasks.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, tuple: TaskTuple) -> Result<StageOutcome, Error>;
}

#[derive(Debug)]
pub enum StageOutcome {
    /// Pass a (possibly rewritten) tuple to the next stage.
    Emit(TaskTuple),
    /// The record is fully handled; skip the remaining stages.
    Ack,
    /// Hand the record back for redelivery by the upstream queue.
    Fail(String),
}
