//! Runs one set end to end against in-memory services:
//! submit → dispatch → asynchronous outcomes → reconcile → wait for the
//! terminal notification.
//!
//! Usage: `tally-cli [LINES_FILE]` (one work item per line; without a file a
//! built-in sample is used).

mod simulation;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::info;

use tally_core::app::AppBuilder;
use tally_core::config::TallyConfig;
use tally_core::domain::{SetMetadata, SetSubmission, WorkItem, slug};
use tally_core::impls::{
    InMemoryObjectStore, InMemorySetTable, InMemoryTaskTable, InMemoryWorkQueue, RecordingNotifier,
};
use tally_core::observability::{LogFormat, init_logging};
use tally_core::ports::{IdGenerator, SystemClock, UlidGenerator};

use crate::simulation::{FAIL_MARKER, SimulatedSynthesis, Workers};

const DISPATCH_WORKERS: usize = 4;
const SIMULATED_POLL_CAP: Duration = Duration::from_millis(250);
const MAX_POLLS: u32 = 400;

fn sample_lines() -> Vec<String> {
    vec![
        "Good morning, and welcome aboard.".to_string(),
        "Please keep your belongings with you.".to_string(),
        String::new(),
        format!("This line is dropped by the service {FAIL_MARKER}"),
        "The next stop is Central Station.".to_string(),
        "Thank you for travelling with us.".to_string(),
    ]
}

fn load_lines() -> anyhow::Result<(String, Vec<String>)> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            Ok((path, raw.lines().map(str::to_string).collect()))
        }
        None => Ok(("sample announcements".to_string(), sample_lines())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_logging(LogFormat::from_env());

    let mut config = TallyConfig::from_env().context("loading configuration")?;
    config.poll_interval = config.poll_interval.min(SIMULATED_POLL_CAP);

    let (name, lines) = load_lines()?;
    let set_id = UlidGenerator::new(SystemClock).generate_set_id(&name);
    let output_location = format!("output/{}", slug(&name));
    let items: Vec<WorkItem> = lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| WorkItem::new(text, format!("{output_location}/{i:04}.mp3")))
        .collect();

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let queue = Arc::new(InMemoryWorkQueue::new());
    let objects = InMemoryObjectStore::new();
    let notifier = RecordingNotifier::new();
    let app = AppBuilder::new()
        .config(config.clone())
        .set_table(Arc::new(InMemorySetTable::new()))
        .task_table(Arc::new(InMemoryTaskTable::new()))
        .work_queue(queue.clone())
        .dispatcher(Arc::new(SimulatedSynthesis::new(
            config.work_bucket.clone(),
            objects.clone(),
            outcome_tx,
        )))
        .object_store(Arc::new(objects))
        .notifier(Arc::new(notifier.clone()))
        .build()?;

    let workers = Workers::spawn(
        DISPATCH_WORKERS,
        queue,
        app.coordinator(),
        outcome_rx,
        app.reconciler(),
    );

    let submission = SetSubmission::new(
        set_id.clone(),
        SetMetadata::new(name.clone(), output_location).with_description("local simulation"),
        items,
    );
    let report = app.coordinator().submit_set(&submission).await?;
    info!(set_id = %report.set_id, queued = report.queued, rejected = report.rejected, "set submitted");

    let (_stop_tx, mut stop_rx) = watch::channel(false);
    let waited = app
        .waiter()
        .with_max_polls(MAX_POLLS)
        .run(&set_id, &mut stop_rx)
        .await?;
    workers.shutdown_and_join().await;

    let progress = app.poller().progress(&set_id).await?;
    println!("set {} finished as {} after {} polls", set_id, waited.status, waited.polls);
    println!("{}", serde_json::to_string_pretty(&progress)?);
    match &waited.notification {
        Some(notification) => {
            println!("{}", notification.subject());
            println!("{}", notification.message());
        }
        None => println!("no terminal notification was published"),
    }
    println!("ops: {}", serde_json::to_string(&app.ops().snapshot())?);
    info!(published = notifier.published().len(), "done");

    Ok(())
}
