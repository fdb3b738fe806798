// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::model::PersonId;
use crate::sweep::{PersonOutcome, ResidenceExpiryService, SweepError, SweepReport};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

struct RunningTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Owns the periodic sweep task. Sweeps once on `start`, then every `interval`.
pub struct ExpiryScheduler {
    service: Arc<ResidenceExpiryService>,
    interval: Duration,
    last_report: Arc<Mutex<Option<SweepReport>>>,
    task: Option<RunningTask>,
}

impl ExpiryScheduler {
    pub fn new(service: Arc<ResidenceExpiryService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            last_report: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Returns false if the scheduler was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            warn!("Residence expiry scheduler already running");
            return false;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweep_loop(
            self.service.clone(),
            self.interval,
            self.last_report.clone(),
            shutdown_rx,
        ));
        self.task = Some(RunningTask { handle, shutdown });
        info!(
            "Residence expiry scheduler started (interval {}s)",
            self.interval.as_secs()
        );
        true
    }

    /// Signals the loop and waits for it. A sweep in progress finishes first.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        // Send only fails once the loop has already exited.
        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            error!("Residence expiry scheduler task ended abnormally: {}", e);
        }
        info!("Residence expiry scheduler stopped");
    }

    /// Event-triggered check after a person's expiry date was edited; bypasses the timer.
    pub async fn trigger_person(&self, person_id: PersonId) -> Result<PersonOutcome, SweepError> {
        self.service.run_sweep_for_person(person_id).await
    }

    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.lock().await.clone()
    }
}

async fn run_sweep_loop(
    service: Arc<ResidenceExpiryService>,
    interval: Duration,
    last_report: Arc<Mutex<Option<SweepReport>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting residence expiry sweep loop");
    loop {
        match service.run_sweep().await {
            Ok(report) => {
                *last_report.lock().await = Some(report);
            }
            // The next tick is the retry.
            Err(e) => error!("Residence expiry sweep failed: {}", e),
        }

        tokio::select! {
            _ = sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Residence expiry sweep loop exited");
}
