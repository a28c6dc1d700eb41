use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One global-id candidate returned by the identity-mapping lookup.
///
/// `local_id` is the locally scoped identifier the global id was minted
/// for; a single external record locator may legitimately map to several
/// global ids across re-harvests and dataset boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCandidate {
    pub global_id: String,
    pub local_id: String,
}

/// Identity-mapping lookup (collaborator).
#[async_trait]
pub trait IdentityMapping: Send + Sync + Debug + 'static {
    /// All global-id candidates mapped to the given record locator.
    async fn candidates_for(&self, record_locator: &str)
    -> Result<Vec<IdentityCandidate>, Error>;
}
