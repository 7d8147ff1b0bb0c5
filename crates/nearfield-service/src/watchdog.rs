//! Abort watchdog for the disable path.
//!
//! `deinitialize()` can block forever on a wedged controller. The watchdog
//! sleeps a fixed duration once and then, unless disarmed first, forces the
//! controller out of whatever it is stuck in via the driver's abort
//! primitive. This guarantees forward progress of the disable path.

use nearfield_driver::{AnyRadioDriver, RadioDriver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::error;

/// One-shot watchdog guarding a single deinitialize call.
#[derive(Debug)]
pub struct AbortWatchdog {
    cancel_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AbortWatchdog {
    /// Arm the watchdog: after `timeout`, abort the controller exactly once.
    ///
    /// Cancellation is race-free: the timer and the cancel signal race
    /// inside one `select!`, so either the abort fires or the cancel wins,
    /// never both, and a cancel arriving after the timer fired is a no-op.
    pub fn arm(driver: Arc<AnyRadioDriver>, timeout: Duration) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    error!("watch dog triggered, aborting controller");
                    driver.abort().await;
                }
                _ = cancel_rx => {}
            }
        });
        Self {
            cancel_tx: Some(cancel_tx),
            task,
        }
    }

    /// Disarm the watchdog and wait for its task to finish.
    pub async fn disarm(mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
        let _ = self.task.await;
    }
}
