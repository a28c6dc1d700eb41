use std::collections::{BTreeMap, HashMap, HashSet};

use gleaner_common::{
    bucket::{Bucket, BucketAllocator},
    state::IdentityCandidate,
    task::HarvestTask,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Collection name for the bucketed per-task error log.
pub(crate) const ERROR_LOG_COLLECTION: &str = "task_error_log";

#[derive(Debug)]
pub(crate) struct TaskRow {
    pub task: HarvestTask,
    pub state_reason: Option<String>,
    pub processed_count: u64,
}

#[derive(Debug)]
pub(crate) struct ErrorTypeRow {
    pub message: String,
    pub occurrences: u64,
    pub sample_resource: Option<String>,
}

#[derive(Debug)]
#[allow(dead_code)]
pub(crate) struct ErrorOccurrence {
    pub resource: String,
    pub message: String,
}

/// In-memory partitioned state store.
///
/// Each map plays the role of one table; the per-task error log is sharded
/// through the bucket allocator exactly like a cardinality-sensitive
/// collection in the real store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    pub(crate) tasks: RwLock<HashMap<i64, TaskRow>>,
    pub(crate) kill_flags: RwLock<HashSet<i64>>,
    /// task id -> error type key -> aggregated counter.
    pub(crate) error_types: RwLock<HashMap<i64, BTreeMap<Uuid, ErrorTypeRow>>>,
    /// (object id, bucket id) -> raw occurrence rows.
    pub(crate) error_log: RwLock<HashMap<(String, Uuid), Vec<ErrorOccurrence>>>,
    /// (collection, object id) -> buckets, oldest first.
    pub(crate) buckets: RwLock<HashMap<(String, String), Vec<Bucket>>>,
    pub(crate) identities: RwLock<HashMap<String, Vec<IdentityCandidate>>>,
    /// (dataset id, global id) pairs already harvested.
    pub(crate) harvested: RwLock<HashSet<(String, String)>>,
    pub(crate) error_allocator: BucketAllocator,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a non-default bucket capacity for the error log; tests exercise
    /// rollover without two hundred thousand writes.
    pub fn with_error_bucket_capacity(capacity: u64) -> Self {
        Self {
            error_allocator: BucketAllocator::new(capacity),
            ..Self::default()
        }
    }

    /// Seeds an identity-mapping candidate for a record locator.
    pub async fn register_identity(&self, record_locator: &str, candidate: IdentityCandidate) {
        self.identities
            .write()
            .await
            .entry(record_locator.to_string())
            .or_default()
            .push(candidate);
    }
}
