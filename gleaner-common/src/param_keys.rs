//! Well-known task/tuple parameter keys read by the core.

pub const RECORD_LOCAL_IDENTIFIER: &str = "RECORD_LOCAL_IDENTIFIER";
pub const GLOBAL_IDENTIFIER: &str = "GLOBAL_IDENTIFIER";
pub const SCHEMA_NAME: &str = "SCHEMA_NAME";
/// The originating source URL a tuple was expanded from.
pub const TASK_INPUT_DATA: &str = "TASK_INPUT_DATA";
/// Per-task override of the harvest window interval, in whole seconds.
pub const HARVEST_INTERVAL_SECS: &str = "HARVEST_INTERVAL_SECS";
pub const DATASET_ID: &str = "DATASET_ID";
pub const PROVIDER_ID: &str = "PROVIDER_ID";
