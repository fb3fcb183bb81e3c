//! In-process stand-ins for the external services, plus the worker pools
//! that move messages between them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tally_core::app::{OutcomeReconciler, SubmissionCoordinator};
use tally_core::domain::{OutcomeNotification, SetId, TaskId, WorkItem};
use tally_core::impls::{InMemoryObjectStore, InMemoryWorkQueue};
use tally_core::ports::{DispatchError, DispatchReceipt, SynthesisDispatcher};

/// Marker that makes the simulated service fail a task after accepting it.
pub const FAIL_MARKER: &str = "#fail";

/// Accepts non-empty texts, "synthesizes" them after a short random delay
/// into the work bucket, and reports the outcome on `outcomes`.
pub struct SimulatedSynthesis {
    work_bucket: String,
    objects: InMemoryObjectStore,
    outcomes: mpsc::UnboundedSender<OutcomeNotification>,
    next: AtomicU64,
}

impl SimulatedSynthesis {
    pub fn new(
        work_bucket: impl Into<String>,
        objects: InMemoryObjectStore,
        outcomes: mpsc::UnboundedSender<OutcomeNotification>,
    ) -> Self {
        Self {
            work_bucket: work_bucket.into(),
            objects,
            outcomes,
            next: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl SynthesisDispatcher for SimulatedSynthesis {
    async fn start_task(&self, set_id: &SetId, item: &WorkItem) -> Result<DispatchReceipt, DispatchError> {
        if item.text.trim().is_empty() {
            return Err(DispatchError::Validation("text must not be empty".to_string()));
        }

        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let task_id = TaskId::new(format!("{set_id}-{n:05}"));
        let key = format!("tmp/{task_id}.{}", item.params.output_format);
        let output_uri = format!("s3://{}/{key}", self.work_bucket);

        let fails = item.text.contains(FAIL_MARKER);
        let delay = Duration::from_millis(rand::thread_rng().gen_range(50..300));
        let objects = self.objects.clone();
        let outcomes = self.outcomes.clone();
        let (id, uri, text) = (task_id.clone(), output_uri.clone(), item.text.clone());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = if fails {
                OutcomeNotification::failed(id, "synthesis failed")
            } else {
                match objects.put_object(key, text.into_bytes()) {
                    Ok(()) => OutcomeNotification::completed(id, uri),
                    Err(e) => OutcomeNotification::failed(id, e.to_string()),
                }
            };
            // receiver gone means the run is over
            let _ = outcomes.send(outcome);
        });

        Ok(DispatchReceipt {
            task_id,
            output_uri: Some(output_uri),
        })
    }
}

/// Background workers; dropping the shutdown sender or calling
/// [`Workers::shutdown_and_join`] stops them.
pub struct Workers {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Workers {
    /// `n` dispatch workers draining `queue`, plus one reconciler draining
    /// `outcomes` in batches.
    pub fn spawn(
        n: usize,
        queue: Arc<InMemoryWorkQueue>,
        coordinator: Arc<SubmissionCoordinator>,
        outcomes: mpsc::UnboundedReceiver<OutcomeNotification>,
        reconciler: Arc<OutcomeReconciler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n + 1);
        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let coordinator = Arc::clone(&coordinator);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(dispatch_loop(worker_id, queue, coordinator, rx)));
        }
        joins.push(tokio::spawn(reconcile_loop(outcomes, reconciler, shutdown_rx)));

        Self { shutdown_tx, joins }
    }

    pub async fn shutdown_and_join(self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn dispatch_loop(
    worker_id: usize,
    queue: Arc<InMemoryWorkQueue>,
    coordinator: Arc<SubmissionCoordinator>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let received = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = queue.receive(Duration::from_millis(200)) => received,
        };

        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!(worker_id, error = %e, "queue receive failed");
                continue;
            }
        };

        debug!(worker_id, group = %message.group, output_key = %message.item.output_key, "dispatching");
        if let Err(e) = coordinator.dispatch_item(&message).await {
            warn!(worker_id, error = %e, "dispatch failed");
        }
    }
}

const OUTCOME_BATCH: usize = 10;

async fn reconcile_loop(
    mut outcomes: mpsc::UnboundedReceiver<OutcomeNotification>,
    reconciler: Arc<OutcomeReconciler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let first = tokio::select! {
            _ = shutdown_rx.changed() => break,
            first = outcomes.recv() => first,
        };
        let Some(first) = first else {
            break;
        };

        let mut batch = vec![first];
        while batch.len() < OUTCOME_BATCH {
            match outcomes.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }

        let report = reconciler.handle_batch(&batch).await;
        info!(
            size = batch.len(),
            reconciled = report.reconciled,
            duplicates = report.duplicates,
            uncounted = report.uncounted,
            failed = report.failed,
            "reconciled outcome batch"
        );
    }
}
