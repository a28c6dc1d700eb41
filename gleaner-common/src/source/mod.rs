use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    harvest::{Granularity, HarvestChunk, RecordHeader},
};

/// A harvest source endpoint (collaborator).
///
/// Every method is retried under the shared [`crate::retry::RetryPolicy`] by
/// the caller; implementations should surface transport failures as
/// [`Error::TransientSource`].
#[async_trait]
pub trait HarvestSource: Send + Sync {
    /// Metadata schemas the source advertises.
    async fn list_schemas(&self) -> Result<BTreeSet<String>, Error>;

    /// Timestamp granularity the source supports for date-range filtering.
    async fn granularity(&self) -> Result<Granularity, Error>;

    /// Datestamp of the oldest record, used as the default window start.
    async fn earliest_datestamp(&self) -> Result<DateTime<Utc>, Error>;

    /// Lists record headers for exactly one schema/set/window chunk.
    async fn list_identifiers(&self, chunk: &HarvestChunk) -> Result<Vec<RecordHeader>, Error>;
}

/// Resolves a source endpoint for a repository URL carried by a task.
pub trait SourceProvider: Send + Sync {
    fn provide(&self, url: &str) -> Result<Arc<dyn HarvestSource>, Error>;
}
