use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::Error, state::BucketStore};

/// Capacity threshold after which a new bucket is allocated for an object
/// id. Keeps any single provider/dataset/task from growing one partition
/// without bound.
pub const DEFAULT_BUCKET_CAPACITY: u64 = 200_000;

/// A capacity-bounded partition key scoping a secondary collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub object_id: String,
    pub bucket_id: Uuid,
    pub rows_count: u64,
}

impl Bucket {
    pub fn fresh(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            bucket_id: Uuid::new_v4(),
            rows_count: 0,
        }
    }
}

/// Assigns and grows fixed-capacity buckets over a [`BucketStore`].
///
/// Concurrent writers racing on a full bucket may both allocate; the
/// duplicate is tolerated because buckets are a sharding aid, not an exact
/// count. Counter values carry no uniqueness guarantee.
#[derive(Clone, Debug)]
pub struct BucketAllocator {
    capacity: u64,
}

impl Default for BucketAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_CAPACITY)
    }
}

impl BucketAllocator {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the bucket that must receive the next write for the object
    /// id, allocating a fresh one when none exists or the current one has
    /// reached capacity. The caller increments the returned bucket's
    /// counter after the write lands.
    pub async fn bucket_for_write(
        &self,
        store: &dyn BucketStore,
        collection: &str,
        object_id: &str,
    ) -> Result<Bucket, Error> {
        if let Some(current) = store.current_bucket(collection, object_id).await? {
            if current.rows_count < self.capacity {
                return Ok(current);
            }
        }
        let bucket = Bucket::fresh(object_id);
        store.insert_bucket(collection, &bucket).await?;
        Ok(bucket)
    }

    /// Convenience for the write path: pick the current bucket and bump its
    /// counter in one call.
    pub async fn assign_and_count(
        &self,
        store: &dyn BucketStore,
        collection: &str,
        object_id: &str,
    ) -> Result<Bucket, Error> {
        let bucket = self.bucket_for_write(store, collection, object_id).await?;
        store
            .increment_bucket(collection, object_id, bucket.bucket_id)
            .await?;
        Ok(bucket)
    }
}
