use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Structured harvesting parameters carried by a harvesting task.
///
/// Sets and schemas are kept ordered so that sub-task enumeration is
/// deterministic within one task.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HarvestingDetails {
    /// Explicit metadata schemas; empty means "discover from the source".
    pub schemas: BTreeSet<String>,
    pub excluded_schemas: BTreeSet<String>,
    /// Record-set filters; empty means a single unfiltered pass.
    pub sets: BTreeSet<String>,
    pub excluded_sets: BTreeSet<String>,
    /// Defaults to the source's earliest datestamp when unset.
    pub date_from: Option<DateTime<Utc>>,
    /// Defaults to "now" when unset.
    pub date_until: Option<DateTime<Utc>>,
    /// Interval override in whole seconds; the splitter config supplies the
    /// default.
    pub interval_secs: Option<i64>,
}

impl HarvestingDetails {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::seconds)
    }
}

/// Finest timestamp resolution the source supports for date-range filtering.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Day,
    Second,
}

impl Granularity {
    /// The smallest step between two adjacent harvest windows.
    pub fn unit(&self) -> Duration {
        match self {
            Granularity::Day => Duration::days(1),
            Granularity::Second => Duration::seconds(1),
        }
    }
}

/// One bounded sub-request against a harvest source: exactly one schema, at
/// most one set, and an inclusive `[from, until]` window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestChunk {
    pub schema: String,
    pub set: Option<String>,
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Record header returned when listing identifiers from a source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordHeader {
    pub identifier: String,
    pub set_specs: Vec<String>,
    pub datestamp: DateTime<Utc>,
    pub deleted: bool,
}

impl RecordHeader {
    /// Filters out headers belonging to any excluded set.
    pub fn in_any_set(&self, sets: &BTreeSet<String>) -> bool {
        self.set_specs.iter().any(|s| sets.contains(s))
    }
}
