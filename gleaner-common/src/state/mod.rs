mod bucket;
mod identity;
mod records;
mod task;

pub use bucket::BucketStore;
pub use identity::{IdentityCandidate, IdentityMapping};
pub use records::HarvestedRecordStore;
pub use task::{ErrorTypeReport, TaskInfoStore};

/// Combined trait for the full state-store surface.
/// Should be used through dyn dispatch at the top level
/// to pass the complete store interface into the engine.
pub trait StateStore:
    TaskInfoStore + BucketStore + IdentityMapping + HarvestedRecordStore
{
}
