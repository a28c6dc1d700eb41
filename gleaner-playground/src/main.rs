use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use gleaner_common::{
    error::Error,
    harvest::{Granularity, HarvestChunk, HarvestingDetails, RecordHeader},
    param_keys,
    source::{HarvestSource, SourceProvider},
    state::{IdentityCandidate, TaskInfoStore},
    task::{HarvestTask, TaskTuple},
};
use gleaner_engine::{
    engine::{EngineConfig, PipelineStage, StageOutcome, WorkEngine},
    resolver::ResolverStage,
};
use gleaner_store_mem::MemoryStateStore;
use tokio::sync::mpsc;
use tracing::info;

/// Synthetic OAI-ish endpoint: two records per window; the Jan 7 window
/// carries a deletion tombstone.
struct SyntheticSource;

#[async_trait]
impl HarvestSource for SyntheticSource {
    async fn list_schemas(&self) -> Result<BTreeSet<String>, Error> {
        Ok(["edm".to_string()].into_iter().collect())
    }

    async fn granularity(&self) -> Result<Granularity, Error> {
        Ok(Granularity::Day)
    }

    async fn earliest_datestamp(&self) -> Result<DateTime<Utc>, Error> {
        Ok(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    async fn list_identifiers(&self, chunk: &HarvestChunk) -> Result<Vec<RecordHeader>, Error> {
        let day = chunk.from.date_naive();
        Ok((0..2)
            .map(|n| RecordHeader {
                identifier: format!("oai:demo:{day}:{n}"),
                set_specs: vec!["open".to_string()],
                datestamp: chunk.from,
                deleted: n == 1 && day == NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            })
            .collect())
    }
}

#[derive(Debug)]
struct SyntheticProvider;

impl SourceProvider for SyntheticProvider {
    fn provide(&self, url: &str) -> Result<Arc<dyn HarvestSource>, Error> {
        info!(url, "providing synthetic source");
        Ok(Arc::new(SyntheticSource))
    }
}

/// Final stage: just prints what the resolver attached.
struct PrintStage;

#[async_trait]
impl PipelineStage for PrintStage {
    fn name(&self) -> &str {
        "print"
    }

    async fn process(&self, tuple: TaskTuple) -> Result<StageOutcome, Error> {
        println!(
            "record {} resolved to {}",
            tuple.resource,
            tuple
                .parameter(param_keys::GLOBAL_IDENTIFIER)
                .unwrap_or("<unresolved>")
        );
        Ok(StageOutcome::Ack)
    }
}

fn demo_task(task_id: i64) -> HarvestTask {
    let mut task = HarvestTask::new(task_id, format!("demo-harvest-{task_id}"), "oai_topology");
    task.input_data = vec!["http://demo.example/oai".to_string()];
    task.parameters
        .insert(param_keys::DATASET_ID.to_string(), "demo".to_string());
    task.harvesting_details = Some(HarvestingDetails {
        schemas: ["edm".to_string()].into_iter().collect(),
        date_from: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        date_until: Some(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()),
        // 2-day windows over a 10-day range.
        interval_secs: Some(2 * 86_400),
        ..Default::default()
    });
    task
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(MemoryStateStore::new());

    // Seed the identity mapping so the resolver has something to chew on,
    // including one ambiguous pair resolved by the dataset prefix.
    let task = demo_task(1);
    // Window starts produced by 2-day windows with a 1-day step.
    let plan_days = ["2024-01-01", "2024-01-04", "2024-01-07", "2024-01-10"];
    let mut item = 0;
    for day in plan_days {
        for n in 0..2 {
            let locator = format!("oai:demo:{day}:{n}");
            store
                .register_identity(
                    &locator,
                    IdentityCandidate {
                        global_id: format!("urn:item:{item}"),
                        local_id: format!("/demo/{locator}"),
                    },
                )
                .await;
            store
                .register_identity(
                    &locator,
                    IdentityCandidate {
                        global_id: format!("urn:other:{item}"),
                        local_id: format!("/other-dataset/{locator}"),
                    },
                )
                .await;
            item += 1;
        }
    }

    let (notify_tx, mut notify_rx) = mpsc::channel::<gleaner_common::notification::Notification>(100);
    let notifier = tokio::spawn(async move {
        while let Some(n) = notify_rx.recv().await {
            println!("notification: task {} {} -> {}", n.task_id, n.resource, n.state);
        }
    });

    let engine = WorkEngine::start(
        EngineConfig::default(),
        store.clone(),
        Arc::new(SyntheticProvider),
        vec![
            Arc::new(ResolverStage::new(store.clone(), store.clone())),
            Arc::new(PrintStage),
        ],
        notify_tx,
    );

    store.create_task(&task).await.unwrap();
    engine.submit(task).await.unwrap();

    // A second task that gets killed before the worker reaches it.
    let doomed = demo_task(2);
    store.create_task(&doomed).await.unwrap();
    store.set_kill_flag(2).await.unwrap();
    engine.submit(doomed).await.unwrap();

    for task_id in [1i64, 2] {
        loop {
            match store.task_report(task_id).await.unwrap() {
                Some(report) if report.state.is_terminal() => {
                    println!(
                        "task {task_id}: {} (reason: {:?}, expected: {:?}, processed: {}, errors: {})",
                        report.state,
                        report.state_reason,
                        report.expected_record_count,
                        report.processed_count,
                        report.error_count
                    );
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
        for error_type in store.error_report(task_id).await.unwrap() {
            println!(
                "  error type {}: {} x{} (e.g. {:?})",
                error_type.error_type,
                error_type.message,
                error_type.occurrences,
                error_type.sample_resource
            );
        }
    }

    engine.shutdown().await;
    notifier.abort();
}
