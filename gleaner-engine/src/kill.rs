use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use gleaner_common::{error::Error, retry::CancellationProbe, state::StateStore};
use tokio::sync::Mutex;

/// How long a negative kill-flag read stays cached. Bounds the cancellation
/// latency contract: a set flag is observed within one TTL at every poll
/// point.
pub const DEFAULT_KILL_POLL_TTL: Duration = Duration::from_secs(5);

/// Store-backed kill-flag poller with a small read-through cache, so the
/// mandatory checks before every chunk and retry attempt stay cheap.
///
/// A positive read is cached permanently: the flag is never cleared while
/// the task is live, only removed once it reaches a terminal state.
#[derive(Debug)]
pub struct KillFlagChecker {
    store: Arc<dyn StateStore>,
    ttl: Duration,
    cache: Mutex<HashMap<i64, (bool, Instant)>>,
}

impl KillFlagChecker {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn has_kill_flag(&self, task_id: i64) -> Result<bool, Error> {
        {
            let cache = self.cache.lock().await;
            if let Some((flagged, read_at)) = cache.get(&task_id) {
                if *flagged || read_at.elapsed() < self.ttl {
                    return Ok(*flagged);
                }
            }
        }

        let flagged = self.store.has_kill_flag(task_id).await?;
        self.cache
            .lock()
            .await
            .insert(task_id, (flagged, Instant::now()));
        Ok(flagged)
    }

    /// Drops the cache entry once a task has settled.
    pub async fn forget(&self, task_id: i64) {
        self.cache.lock().await.remove(&task_id);
    }
}

#[async_trait]
impl CancellationProbe for KillFlagChecker {
    async fn is_cancelled(&self, task_id: i64) -> Result<bool, Error> {
        self.has_kill_flag(task_id).await
    }
}
