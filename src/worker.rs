//! Fixed-interval worker loop around [`Pipeline`].
//!
//! Each cycle runs in its own task so that an error or a panic ends that
//! cycle only. Shutdown is observed between cycles, never mid-cycle.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::WorkerConfig;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Queued,
    /// A manual run is already waiting; requests coalesce.
    AlreadyQueued,
    /// The worker has stopped.
    Stopped,
}

/// Cheap handle for requesting an out-of-schedule cycle.
#[derive(Clone)]
pub struct CycleTrigger {
    tx: mpsc::Sender<()>,
}

impl CycleTrigger {
    /// Wrap the sending half of a capacity-1 channel.
    pub fn new(tx: mpsc::Sender<()>) -> Self {
        Self { tx }
    }

    /// Never blocks. Manual runs ignore the active toggle.
    pub fn trigger(&self) -> TriggerOutcome {
        match self.tx.try_send(()) {
            Ok(()) => TriggerOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::AlreadyQueued,
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Stopped,
        }
    }
}

pub struct Worker {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    run_on_start: bool,
}

impl Worker {
    pub fn new(pipeline: Arc<Pipeline>, cfg: &WorkerConfig) -> Self {
        Self::with_interval(pipeline, cfg.interval(), cfg.run_on_start)
    }

    pub fn with_interval(pipeline: Arc<Pipeline>, interval: Duration, run_on_start: bool) -> Self {
        Self {
            pipeline,
            interval,
            run_on_start,
        }
    }

    /// Start the loop on the current runtime.
    ///
    /// Dropping the returned handle detaches the worker; it keeps running
    /// until [`WorkerHandle::shutdown`] is called on a live handle or the
    /// runtime stops.
    pub fn spawn(self) -> WorkerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(trigger_rx, shutdown_rx));
        WorkerHandle {
            trigger: CycleTrigger { tx: trigger_tx },
            shutdown: shutdown_tx,
            join,
        }
    }

    async fn run(self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: watch::Receiver<bool>) {
        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            run_on_start = self.run_on_start,
            "worker started"
        );

        loop {
            tokio::select! {
                biased;
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.is_active().await {
                        self.run_guarded("schedule").await;
                    }
                }
                Some(()) = trigger_rx.recv() => {
                    self.run_guarded("manual").await;
                }
            }
        }

        tracing::info!("worker stopped");
    }

    /// Paused or unreadable toggle skips the scheduled cycle.
    async fn is_active(&self) -> bool {
        match self.pipeline.store().is_active().await {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!("bot paused, skipping scheduled cycle");
                counter!("trend_cycles_skipped_total").increment(1);
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot read active toggle, skipping scheduled cycle");
                counter!("trend_cycles_skipped_total").increment(1);
                false
            }
        }
    }

    async fn run_guarded(&self, trigger: &'static str) {
        let pipeline = Arc::clone(&self.pipeline);
        let outcome = tokio::spawn(async move { pipeline.run_cycle().await }).await;
        match outcome {
            Ok(Ok(report)) => {
                tracing::debug!(trigger, subject = %report.subject, "cycle done");
            }
            Ok(Err(e)) => {
                counter!("trend_cycle_failures_total").increment(1);
                tracing::error!(trigger, error = %e, "cycle aborted");
            }
            Err(join) if join.is_panic() => {
                counter!("trend_cycle_failures_total").increment(1);
                tracing::error!(trigger, "cycle panicked");
            }
            Err(join) => {
                counter!("trend_cycle_failures_total").increment(1);
                tracing::error!(trigger, error = %join, "cycle task cancelled");
            }
        }
    }
}

pub struct WorkerHandle {
    trigger: CycleTrigger,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn trigger(&self) -> TriggerOutcome {
        self.trigger.trigger()
    }

    pub fn trigger_handle(&self) -> CycleTrigger {
        self.trigger.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Let the running cycle finish, then stop.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "worker task ended abnormally");
        }
    }
}
