use async_trait::async_trait;
use gleaner_common::{
    error::Error,
    state::{IdentityCandidate, IdentityMapping},
};

use crate::db::MemoryStateStore;

#[async_trait]
impl IdentityMapping for MemoryStateStore {
    async fn candidates_for(
        &self,
        record_locator: &str,
    ) -> Result<Vec<IdentityCandidate>, Error> {
        let identities = self.identities.read().await;
        Ok(identities.get(record_locator).cloned().unwrap_or_default())
    }
}
