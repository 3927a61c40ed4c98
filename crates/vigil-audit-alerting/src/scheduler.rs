//! Periodic driving of the detection engine.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::engine::AlertEngine;

/// Handle on the background detection task.
///
/// The task runs one detection pass per configured period, starting with
/// an immediate pass on spawn. Call [`stop`] for an orderly exit; a
/// failed pass is logged and the loop keeps going.
///
/// [`stop`]: DetectionLoop::stop
pub struct DetectionLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DetectionLoop {
    /// Spawn the detection task on the current runtime.
    pub fn spawn(engine: Arc<AlertEngine>) -> Self {
        let period = engine.config().detection_period();
        let (shutdown, mut signal) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "detection loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.run_detection_pass() {
                            Ok(raised) if raised.is_empty() => {}
                            Ok(raised) => {
                                info!(raised = raised.len(), "detection pass raised alerts");
                            }
                            Err(e) => error!(error = %e, "detection pass failed"),
                        }
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("detection loop stopped");
        });

        Self { shutdown, task }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
