use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::Error;

/// Harvested-records state: which global ids have already been seen under
/// a dataset. Consulted by the identifier resolver's last cascade step and
/// written once a record has been attributed.
#[async_trait]
pub trait HarvestedRecordStore: Send + Sync + Debug + 'static {
    async fn record_exists(&self, dataset_id: &str, global_id: &str) -> Result<bool, Error>;

    /// Upsert; replaying the same insert is harmless.
    async fn insert_record(&self, dataset_id: &str, global_id: &str) -> Result<(), Error>;
}
