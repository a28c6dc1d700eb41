use async_trait::async_trait;
use gleaner_common::{error::Error, state::HarvestedRecordStore};

use crate::db::MemoryStateStore;

#[async_trait]
impl HarvestedRecordStore for MemoryStateStore {
    async fn record_exists(&self, dataset_id: &str, global_id: &str) -> Result<bool, Error> {
        let harvested = self.harvested.read().await;
        Ok(harvested.contains(&(dataset_id.to_string(), global_id.to_string())))
    }

    async fn insert_record(&self, dataset_id: &str, global_id: &str) -> Result<(), Error> {
        self.harvested
            .write()
            .await
            .insert((dataset_id.to_string(), global_id.to_string()));
        Ok(())
    }
}
