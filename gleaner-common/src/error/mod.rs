use std::fmt::Debug;

use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Database Error: {0}")]
    Database(String),

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource Not Found: {resource_type} with ID {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("State Transition Error: {0}")]
    StateTransition(String),

    #[error("Transient Source Error: {0}")]
    TransientSource(String),

    #[error("Ambiguous identifier: locator {record_locator} maps to multiple global ids in dataset {dataset_id}")]
    AmbiguousIdentifier {
        dataset_id: String,
        record_locator: String,
    },

    #[error("Splitter Fatal Error: {0}")]
    SplitterFatal(String),

    #[error("Capacity Exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Channel Communication Error: {0}")]
    ChannelComm(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that abort a whole task rather than a single record.
    pub fn is_task_fatal(&self) -> bool {
        matches!(self, Error::SplitterFatal(_) | Error::Cancelled(_))
    }
}

/// Derives the grouping key for an error message.
///
/// Repeated failures with the same message collapse into one counter, so the
/// key is a stable function of the message text, not of the free-form detail.
pub fn error_type_key(message: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, message.trim().as_bytes())
}
