use std::sync::Arc;

use async_trait::async_trait;
use gleaner_common::{
    error::Error,
    param_keys,
    state::{HarvestedRecordStore, IdentityCandidate, IdentityMapping},
    task::TaskTuple,
};
use tracing::trace;

use crate::engine::{PipelineStage, StageOutcome};

/// Disambiguates a global record identifier among the candidates returned
/// by the identity-mapping lookup.
///
/// A single external local identifier may legitimately map to multiple
/// global ids across re-harvests and dataset boundaries; naive "first
/// candidate" resolution silently misattributes records.
pub struct IdentifierResolver {
    identity: Arc<dyn IdentityMapping>,
    records: Arc<dyn HarvestedRecordStore>,
}

impl IdentifierResolver {
    pub fn new(
        identity: Arc<dyn IdentityMapping>,
        records: Arc<dyn HarvestedRecordStore>,
    ) -> Self {
        Self { identity, records }
    }

    /// Ordered cascade, first match wins:
    /// 1. a single candidate overall;
    /// 2. a single candidate whose local id carries the dataset prefix;
    /// 3. among prefixed candidates, a single one whose suffix is contained
    ///    in every other suffix;
    /// 4. a single candidate already present in the harvested-records state.
    pub async fn resolve(
        &self,
        dataset_id: &str,
        record_locator: &str,
    ) -> Result<String, Error> {
        let candidates = self.identity.candidates_for(record_locator).await?;
        match candidates.len() {
            0 => {
                return Err(Error::NotFound {
                    resource_type: "GlobalIdentifier".to_string(),
                    resource_id: record_locator.to_string(),
                });
            }
            1 => return Ok(candidates[0].global_id.clone()),
            _ => {}
        }

        let prefix = format!("/{dataset_id}/");
        let prefixed: Vec<&IdentityCandidate> = candidates
            .iter()
            .filter(|c| c.local_id.starts_with(&prefix))
            .collect();
        if prefixed.len() == 1 {
            return Ok(prefixed[0].global_id.clone());
        }

        if prefixed.len() > 1 {
            let suffixes: Vec<&str> = prefixed
                .iter()
                .map(|c| &c.local_id[prefix.len()..])
                .collect();
            let nested: Vec<&&IdentityCandidate> = prefixed
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    suffixes
                        .iter()
                        .enumerate()
                        .all(|(j, other)| *i == j || other.contains(suffixes[*i]))
                })
                .map(|(_, c)| c)
                .collect();
            if nested.len() == 1 {
                return Ok(nested[0].global_id.clone());
            }
        }

        // Last resort: prefer the candidate this dataset has already seen.
        let pool: Vec<&IdentityCandidate> = if prefixed.is_empty() {
            candidates.iter().collect()
        } else {
            prefixed
        };
        let mut seen = Vec::new();
        for candidate in pool {
            if self
                .records
                .record_exists(dataset_id, &candidate.global_id)
                .await?
            {
                seen.push(candidate);
            }
        }
        if seen.len() == 1 {
            trace!(dataset_id, record_locator, "resolved via harvested-records state");
            return Ok(seen[0].global_id.clone());
        }

        Err(Error::AmbiguousIdentifier {
            dataset_id: dataset_id.to_string(),
            record_locator: record_locator.to_string(),
        })
    }
}

/// Pipeline stage that stamps the resolved global identifier into the tuple
/// and records the attribution in the harvested-records state.
pub struct ResolverStage {
    resolver: IdentifierResolver,
    records: Arc<dyn HarvestedRecordStore>,
}

impl ResolverStage {
    pub fn new(
        identity: Arc<dyn IdentityMapping>,
        records: Arc<dyn HarvestedRecordStore>,
    ) -> Self {
        Self {
            resolver: IdentifierResolver::new(identity, records.clone()),
            records,
        }
    }
}

#[async_trait]
impl PipelineStage for ResolverStage {
    fn name(&self) -> &str {
        "identifier-resolver"
    }

    async fn process(&self, mut tuple: TaskTuple) -> Result<StageOutcome, Error> {
        let dataset_id = tuple
            .parameter(param_keys::DATASET_ID)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "tuple {} carries no {} parameter",
                    tuple.resource,
                    param_keys::DATASET_ID
                ))
            })?
            .to_string();
        let locator = tuple
            .parameter(param_keys::RECORD_LOCAL_IDENTIFIER)
            .unwrap_or(&tuple.resource)
            .to_string();

        let global_id = self.resolver.resolve(&dataset_id, &locator).await?;
        self.records.insert_record(&dataset_id, &global_id).await?;
        tuple.add_parameter(param_keys::GLOBAL_IDENTIFIER, global_id);
        Ok(StageOutcome::Emit(tuple))
    }
}
