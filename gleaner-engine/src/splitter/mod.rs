use chrono::{DateTime, Duration, Utc};
use gleaner_common::{
    error::Error,
    harvest::{Granularity, HarvestChunk},
    param_keys,
    retry::{CancellationProbe, RetryPolicy, run_retryable},
    source::HarvestSource,
    task::HarvestTask,
};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct SplitterConfig {
    /// Window size used when neither the harvesting details nor a task
    /// parameter override it.
    pub default_interval: Duration,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::days(30),
        }
    }
}

/// Decomposes one harvesting task into bounded schema × set × date-window
/// sub-requests.
#[derive(Clone, Debug)]
pub struct HarvestSplitter {
    config: SplitterConfig,
    retry: RetryPolicy,
}

impl HarvestSplitter {
    pub fn new(config: SplitterConfig, retry: RetryPolicy) -> Self {
        Self { config, retry }
    }

    /// Resolves everything that needs source I/O (schema list, granularity,
    /// window defaults) into a pure, deterministic enumeration plan.
    ///
    /// Discovery calls run under the shared retry policy with kill-flag
    /// checks between attempts. Malformed parameters fail with
    /// [`Error::SplitterFatal`], which drops the whole task.
    pub async fn plan(
        &self,
        task: &HarvestTask,
        source: &dyn HarvestSource,
        probe: &dyn CancellationProbe,
    ) -> Result<HarvestPlan, Error> {
        let task_id = task.task_id;
        let details = task.harvesting_details.as_ref().ok_or_else(|| {
            Error::SplitterFatal(format!("task {task_id} has no harvesting details"))
        })?;

        let schemas: Vec<String> = if details.schemas.is_empty() {
            let discovered =
                run_retryable(&self.retry, probe, task_id, || source.list_schemas()).await?;
            discovered
                .into_iter()
                .filter(|s| !details.excluded_schemas.contains(s))
                .collect()
        } else {
            details
                .schemas
                .iter()
                .filter(|s| !details.excluded_schemas.contains(*s))
                .cloned()
                .collect()
        };
        if schemas.is_empty() {
            return Err(Error::SplitterFatal(
                "no metadata schemas remain after exclusion".to_string(),
            ));
        }

        let granularity =
            run_retryable(&self.retry, probe, task_id, || source.granularity()).await?;

        let from = match details.date_from {
            Some(from) => from,
            None => {
                run_retryable(&self.retry, probe, task_id, || source.earliest_datestamp()).await?
            }
        };
        let until = details.date_until.unwrap_or_else(Utc::now);
        if from > until {
            return Err(Error::SplitterFatal(format!(
                "date window is inverted: from {from} is after until {until}"
            )));
        }

        let mut interval = self.resolve_interval(task)?;
        if granularity == Granularity::Day {
            // Sub-day windows are meaningless at day granularity.
            interval = Duration::days(interval.num_days().max(1));
        }

        let sets: Vec<Option<String>> = if details.sets.is_empty() {
            vec![None]
        } else {
            details.sets.iter().cloned().map(Some).collect()
        };
        let combos: Vec<(String, Option<String>)> = schemas
            .iter()
            .flat_map(|schema| sets.iter().map(move |set| (schema.clone(), set.clone())))
            .collect();

        debug!(
            task_id,
            combos = combos.len(),
            %from,
            %until,
            granularity = %granularity,
            "harvest plan resolved"
        );

        Ok(HarvestPlan {
            combos,
            from,
            until,
            interval,
            step: granularity.unit(),
            granularity,
        })
    }

    fn resolve_interval(&self, task: &HarvestTask) -> Result<Duration, Error> {
        let interval = match task.parameter(param_keys::HARVEST_INTERVAL_SECS) {
            Some(raw) => {
                let secs: i64 = raw.parse().map_err(|_| {
                    Error::SplitterFatal(format!("unparseable harvest interval: {raw:?}"))
                })?;
                Duration::seconds(secs)
            }
            None => task
                .harvesting_details
                .as_ref()
                .and_then(|d| d.interval())
                .unwrap_or(self.config.default_interval),
        };
        if interval <= Duration::zero() {
            return Err(Error::SplitterFatal(format!(
                "harvest interval must be positive, got {interval}"
            )));
        }
        Ok(interval)
    }
}

/// Fully resolved enumeration plan for one harvesting task.
///
/// `chunks()` produces the schema × set × window sequence lazily; a fresh
/// call re-derives it from scratch (the iterator is not restartable).
#[derive(Clone, Debug)]
pub struct HarvestPlan {
    pub combos: Vec<(String, Option<String>)>,
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    /// Window size, already rounded for the source's granularity.
    pub interval: Duration,
    /// Gap between one window's end and the next window's start.
    pub step: Duration,
    pub granularity: Granularity,
}

impl HarvestPlan {
    pub fn chunks(&self) -> ChunkIter<'_> {
        ChunkIter {
            plan: self,
            combo_idx: 0,
            cursor: self.from,
        }
    }
}

pub struct ChunkIter<'a> {
    plan: &'a HarvestPlan,
    combo_idx: usize,
    cursor: DateTime<Utc>,
}

impl Iterator for ChunkIter<'_> {
    type Item = HarvestChunk;

    fn next(&mut self) -> Option<HarvestChunk> {
        loop {
            if self.combo_idx >= self.plan.combos.len() {
                return None;
            }
            if self.cursor > self.plan.until {
                self.combo_idx += 1;
                self.cursor = self.plan.from;
                continue;
            }
            let start = self.cursor;
            let end = (start + self.plan.interval).min(self.plan.until);
            self.cursor = end + self.plan.step;
            let (schema, set) = &self.plan.combos[self.combo_idx];
            return Some(HarvestChunk {
                schema: schema.clone(),
                set: set.clone(),
                from: start,
                until: end,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use gleaner_common::{
        harvest::{HarvestingDetails, RecordHeader},
        retry::NeverCancelled,
    };
    use std::collections::BTreeSet;
    use std::time::Duration as StdDuration;

    struct StubSource {
        schemas: BTreeSet<String>,
        granularity: Granularity,
        earliest: DateTime<Utc>,
    }

    #[async_trait]
    impl HarvestSource for StubSource {
        async fn list_schemas(&self) -> Result<BTreeSet<String>, Error> {
            Ok(self.schemas.clone())
        }

        async fn granularity(&self) -> Result<Granularity, Error> {
            Ok(self.granularity)
        }

        async fn earliest_datestamp(&self) -> Result<DateTime<Utc>, Error> {
            Ok(self.earliest)
        }

        async fn list_identifiers(&self, _chunk: &HarvestChunk) -> Result<Vec<RecordHeader>, Error> {
            Ok(Vec::new())
        }
    }

    fn day_source() -> StubSource {
        StubSource {
            schemas: ["edm".to_string(), "oai_dc".to_string()].into_iter().collect(),
            granularity: Granularity::Day,
            earliest: date(2000, 1, 1),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn splitter() -> HarvestSplitter {
        HarvestSplitter::new(
            SplitterConfig::default(),
            RetryPolicy {
                max_attempts: 3,
                delay: StdDuration::from_millis(1),
            },
        )
    }

    fn harvesting_task(details: HarvestingDetails) -> HarvestTask {
        let mut task = HarvestTask::new(1, "split-me", "oai_topology");
        task.harvesting_details = Some(details);
        task
    }

    #[tokio::test]
    async fn reference_scenario_yields_twelve_chunks() {
        // from = 2012-01-15, until = 2012-04-01, interval = 30 days,
        // 2 schemas x 2 record sets.
        let details = HarvestingDetails {
            schemas: ["edm".to_string(), "oai_dc".to_string()].into_iter().collect(),
            sets: ["open".to_string(), "images".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 15)),
            date_until: Some(date(2012, 4, 1)),
            interval_secs: Some(30 * 86_400),
            ..Default::default()
        };
        let task = harvesting_task(details);
        let plan = splitter()
            .plan(&task, &day_source(), &NeverCancelled)
            .await
            .unwrap();

        let chunks: Vec<HarvestChunk> = plan.chunks().collect();
        assert_eq!(chunks.len(), 12);
        assert!(chunks.iter().all(|c| c.until - c.from <= Duration::days(30)));
    }

    #[tokio::test]
    async fn windows_tile_without_gap_or_overlap() {
        let details = HarvestingDetails {
            schemas: ["edm".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 15)),
            date_until: Some(date(2012, 4, 1)),
            interval_secs: Some(30 * 86_400),
            ..Default::default()
        };
        let task = harvesting_task(details);
        let plan = splitter()
            .plan(&task, &day_source(), &NeverCancelled)
            .await
            .unwrap();

        let windows: Vec<HarvestChunk> =
            plan.chunks().filter(|c| c.schema == "edm").collect();
        assert_eq!(windows.first().unwrap().from, plan.from);
        assert_eq!(windows.last().unwrap().until, plan.until);
        for pair in windows.windows(2) {
            // Next window starts exactly one granularity unit after the
            // previous one ends.
            assert_eq!(pair[1].from, pair[0].until + Duration::days(1));
        }
    }

    #[tokio::test]
    async fn day_granularity_rounds_interval_down_to_whole_days() {
        let details = HarvestingDetails {
            schemas: ["edm".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 1)),
            date_until: Some(date(2012, 1, 10)),
            // 2.5 days rounds down to 2.
            interval_secs: Some(2 * 86_400 + 43_200),
            ..Default::default()
        };
        let task = harvesting_task(details);
        let plan = splitter()
            .plan(&task, &day_source(), &NeverCancelled)
            .await
            .unwrap();
        assert_eq!(plan.interval, Duration::days(2));

        // A sub-day interval still spans at least one whole day.
        let details = HarvestingDetails {
            schemas: ["edm".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 1)),
            date_until: Some(date(2012, 1, 10)),
            interval_secs: Some(3600),
            ..Default::default()
        };
        let plan = splitter()
            .plan(&harvesting_task(details), &day_source(), &NeverCancelled)
            .await
            .unwrap();
        assert_eq!(plan.interval, Duration::days(1));
    }

    #[tokio::test]
    async fn second_granularity_steps_by_one_second() {
        let source = StubSource {
            granularity: Granularity::Second,
            ..day_source()
        };
        let details = HarvestingDetails {
            schemas: ["edm".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 1)),
            date_until: Some(Utc.with_ymd_and_hms(2012, 1, 1, 0, 59, 59).unwrap()),
            interval_secs: Some(600),
            ..Default::default()
        };
        let plan = splitter()
            .plan(&harvesting_task(details), &source, &NeverCancelled)
            .await
            .unwrap();
        let windows: Vec<HarvestChunk> = plan.chunks().collect();
        // 3599 seconds at 600-second windows plus 1-second steps.
        assert_eq!(windows.len(), 6);
        for pair in windows.windows(2) {
            assert_eq!(pair[1].from, pair[0].until + Duration::seconds(1));
        }
    }

    #[tokio::test]
    async fn discovered_schemas_honor_exclusions() {
        let details = HarvestingDetails {
            excluded_schemas: ["oai_dc".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 1)),
            date_until: Some(date(2012, 1, 2)),
            ..Default::default()
        };
        let plan = splitter()
            .plan(&harvesting_task(details), &day_source(), &NeverCancelled)
            .await
            .unwrap();
        assert_eq!(plan.combos.len(), 1);
        assert_eq!(plan.combos[0].0, "edm");
    }

    #[tokio::test]
    async fn inverted_window_is_splitter_fatal() {
        let details = HarvestingDetails {
            schemas: ["edm".to_string()].into_iter().collect(),
            date_from: Some(date(2013, 1, 1)),
            date_until: Some(date(2012, 1, 1)),
            ..Default::default()
        };
        let err = splitter()
            .plan(&harvesting_task(details), &day_source(), &NeverCancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SplitterFatal(_)));
    }

    #[tokio::test]
    async fn unparseable_interval_parameter_is_splitter_fatal() {
        let details = HarvestingDetails {
            schemas: ["edm".to_string()].into_iter().collect(),
            date_from: Some(date(2012, 1, 1)),
            date_until: Some(date(2012, 2, 1)),
            ..Default::default()
        };
        let mut task = harvesting_task(details);
        task.parameters.insert(
            param_keys::HARVEST_INTERVAL_SECS.to_string(),
            "a fortnight".to_string(),
        );
        let err = splitter()
            .plan(&task, &day_source(), &NeverCancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SplitterFatal(_)));
    }
}
