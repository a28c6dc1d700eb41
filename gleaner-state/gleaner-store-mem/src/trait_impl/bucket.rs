use async_trait::async_trait;
use gleaner_common::{bucket::Bucket, error::Error, state::BucketStore};
use uuid::Uuid;

use crate::db::MemoryStateStore;

#[async_trait]
impl BucketStore for MemoryStateStore {
    async fn current_bucket(
        &self,
        collection: &str,
        object_id: &str,
    ) -> Result<Option<Bucket>, Error> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(&(collection.to_string(), object_id.to_string()))
            .and_then(|v| v.last())
            .cloned())
    }

    async fn insert_bucket(&self, collection: &str, bucket: &Bucket) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry((collection.to_string(), bucket.object_id.clone()))
            .or_default()
            .push(bucket.clone());
        Ok(())
    }

    async fn increment_bucket(
        &self,
        collection: &str,
        object_id: &str,
        bucket_id: Uuid,
    ) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        let row = buckets
            .get_mut(&(collection.to_string(), object_id.to_string()))
            .and_then(|v| v.iter_mut().find(|b| b.bucket_id == bucket_id))
            .ok_or_else(|| Error::NotFound {
                resource_type: "Bucket".to_string(),
                resource_id: bucket_id.to_string(),
            })?;
        row.rows_count += 1;
        Ok(())
    }

    async fn decrement_bucket(
        &self,
        collection: &str,
        object_id: &str,
        bucket_id: Uuid,
    ) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        let key = (collection.to_string(), object_id.to_string());
        if let Some(list) = buckets.get_mut(&key) {
            if let Some(row) = list.iter_mut().find(|b| b.bucket_id == bucket_id) {
                row.rows_count = row.rows_count.saturating_sub(1);
                if row.rows_count == 0 {
                    list.retain(|b| b.bucket_id != bucket_id);
                }
            }
        }
        Ok(())
    }

    async fn all_buckets(&self, collection: &str, object_id: &str) -> Result<Vec<Bucket>, Error> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(&(collection.to_string(), object_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
