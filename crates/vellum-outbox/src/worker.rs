//! Background worker that runs the pipeline on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::PipelineRunner;

/// Default interval between pipeline runs.
pub const DEFAULT_RUN_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically runs the pipeline for all active tenants until stopped.
pub struct PipelineWorker {
    runner: Arc<PipelineRunner>,
    interval: Duration,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self {
            runner,
            interval: DEFAULT_RUN_INTERVAL,
            shutdown_tx: None,
            handle: None,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the worker loop. A no-op if already running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let runner = Arc::clone(&self.runner);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            tracing::info!(
                target: "outbox_pipeline",
                interval_secs = interval.as_secs(),
                "Pipeline worker started"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = runner.run_all().await {
                            tracing::error!(
                                target: "outbox_pipeline",
                                error = %e,
                                "Scheduled pipeline run failed"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!(
                                target: "outbox_pipeline",
                                "Pipeline worker stopping"
                            );
                            break;
                        }
                    }
                }
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
