//! Daily retraining loop
//!
//! A single tokio task sleeps until the next configured local time of day,
//! retrains from the CSV source and reschedules. Failures are logged and the
//! loop waits for the next cycle.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::service::{self, ModelService};

/// Handle to the background retraining task
pub struct RetrainScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RetrainScheduler {
    /// Start the loop on the current runtime
    pub fn spawn(service: Arc<ModelService>, data_path: PathBuf, at: NaiveTime) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(service, data_path, at, shutdown_rx));
        tracing::info!("Retrain scheduler started (daily at {})", at.format("%H:%M:%S"));
        Self { shutdown, handle }
    }

    /// Stop the loop. A retrain already in progress is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("Retrain scheduler task failed: {}", e);
        }
    }
}

async fn run(service: Arc<ModelService>, data_path: PathBuf, at: NaiveTime, mut shutdown: watch::Receiver<bool>) {
    loop {
        let now = Local::now();
        let next = next_run_after(&now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!("Next scheduled retrain at {}", next.format("%Y-%m-%d %H:%M:%S%z"));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                tracing::info!("Retrain scheduler stopped");
                return;
            }
        }

        run_once(&service, data_path.clone()).await;
    }
}

/// One scheduled retrain. Errors are logged, never propagated.
pub async fn run_once(service: &Arc<ModelService>, data_path: PathBuf) -> bool {
    tracing::info!("Scheduled retraining from {}", data_path.display());
    match service::blocking(service, move |s| s.train_from_source(&data_path)).await {
        Ok(path) => {
            tracing::info!("Scheduled retraining complete: {}", path.display());
            true
        }
        Err(e) => {
            tracing::error!(error = ?e, "Scheduled retraining failed: {}", e);
            false
        }
    }
}

/// First instant strictly after `now` whose local time of day is `at`.
/// Days on which `at` does not exist (DST gap) are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();

    for _ in 0..4 {
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    now.clone() + Duration::days(1)
}
