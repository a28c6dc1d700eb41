use std::fmt::Debug;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{bucket::Bucket, error::Error};

/// Bucket primitives over the partitioned store.
///
/// `collection` names the bucketed secondary collection (e.g. the per-task
/// error log); `object_id` is the coarse key being sharded (e.g. a task id
/// or a provider/dataset pair). Buckets for one object id are ordered by
/// allocation; the most recently allocated one is "current".
#[async_trait]
pub trait BucketStore: Send + Sync + Debug + 'static {
    /// The most recently allocated bucket for the object id, if any.
    async fn current_bucket(
        &self,
        collection: &str,
        object_id: &str,
    ) -> Result<Option<Bucket>, Error>;

    /// Persists a freshly allocated bucket as the new current one.
    async fn insert_bucket(&self, collection: &str, bucket: &Bucket) -> Result<(), Error>;

    /// Atomic +1 on the bucket's row counter.
    async fn increment_bucket(
        &self,
        collection: &str,
        object_id: &str,
        bucket_id: Uuid,
    ) -> Result<(), Error>;

    /// Atomic -1; implementations remove buckets that reach zero rows.
    async fn decrement_bucket(
        &self,
        collection: &str,
        object_id: &str,
        bucket_id: Uuid,
    ) -> Result<(), Error>;

    /// All buckets for the object id, oldest first (older buckets stay
    /// readable after rollover).
    async fn all_buckets(&self, collection: &str, object_id: &str) -> Result<Vec<Bucket>, Error>;
}
