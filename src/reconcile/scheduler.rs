//! Coalescing trigger and background loop for the reconciliation job.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{FlushOutcome, Reconciler};

/// Requests a reconciliation run.
///
/// Holds a single-slot channel: while one request is pending, further
/// requests are absorbed by it.
#[derive(Debug, Clone)]
pub struct ReconcileScheduler {
    tx: mpsc::Sender<()>,
}

/// Receiving end consumed by [`run_reconcile_worker`].
#[derive(Debug)]
pub struct ReconcileTrigger {
    rx: mpsc::Receiver<()>,
}

impl ReconcileScheduler {
    #[must_use]
    pub fn channel() -> (Self, ReconcileTrigger) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, ReconcileTrigger { rx })
    }

    /// Ask for a run. Returns false if a run was already pending or no worker
    /// is listening.
    pub fn schedule(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => {
                debug!("Reconciliation scheduled");
                true
            }
            Err(TrySendError::Full(())) => {
                debug!("Reconciliation already pending");
                false
            }
            Err(TrySendError::Closed(())) => {
                debug!("No reconciliation worker listening; next periodic run will catch up");
                false
            }
        }
    }
}

impl ReconcileTrigger {
    /// Take a pending request without waiting.
    pub fn try_take(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

async fn run_and_log(reconciler: &Reconciler) {
    match reconciler.run_once().await {
        Ok(FlushOutcome::Flushed(report)) => {
            if report.fields_applied > 0 {
                info!(
                    keys = report.keys_scanned,
                    applied = report.fields_applied,
                    rows_missing = report.rows_missing,
                    "Reconciled buffered counters"
                );
            }
        }
        Ok(FlushOutcome::Skipped) => {}
        Err(e) => {
            error!("Reconciliation run failed: {e}");
        }
    }
}

/// Run the reconciliation worker.
///
/// Runs once on start, then on every interval tick and every scheduled
/// request, until `shutdown` is cancelled.
pub async fn run_reconcile_worker(
    reconciler: Reconciler,
    mut trigger: ReconcileTrigger,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        interval_secs = interval.as_secs(),
        "Starting reconciliation worker"
    );

    run_and_log(&reconciler).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip the first immediate tick (we already ran)

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_and_log(&reconciler).await;
            }
            Some(()) = trigger.rx.recv() => {
                run_and_log(&reconciler).await;
            }
            () = shutdown.cancelled() => {
                info!("Reconciliation worker shutting down");
                break;
            }
        }
    }
}
