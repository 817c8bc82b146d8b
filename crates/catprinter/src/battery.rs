//! Periodic battery polling.
//!
//! The monitor runs as a tokio task that queries the battery through the
//! [`TransferController`], so polls queue behind print jobs instead of
//! interleaving with them. It stops as soon as the link is reported down,
//! when [`BatteryMonitor::stop`] is called, or when the monitor is dropped.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transfer::TransferController;
use crate::transport::Transport;
use crate::CatPrinterError;

/// Default interval between battery polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest allowed interval between battery polls.
pub const MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Coarse battery level for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryLevel {
    Low,
    Medium,
    High,
}

impl BatteryLevel {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..20 => Self::Low,
            20..50 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Handle to a running battery poll task.
pub struct BatteryMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl BatteryMonitor {
    /// Start polling every `interval` (at least [`MIN_INTERVAL`]).
    ///
    /// The first poll happens immediately.
    pub fn spawn<T>(controller: TransferController<T>, interval: Duration) -> Self
    where
        T: Transport + 'static,
    {
        Self::start(controller, interval.max(MIN_INTERVAL))
    }

    fn start<T>(controller: TransferController<T>, interval: Duration) -> Self
    where
        T: Transport + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(controller, interval, cancel.clone()));
        tracing::debug!(interval_secs = interval.as_secs(), "Battery monitor started");
        Self {
            cancel,
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the poll task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the task to exit. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for BatteryMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop<T: Transport + 'static>(
    controller: TransferController<T>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        if !controller.is_connected() {
            tracing::info!("Battery monitor stopped (disconnected)");
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Battery monitor stopped");
                return;
            }
            _ = controller.disconnected() => {
                tracing::info!("Battery monitor stopped (disconnected)");
                return;
            }
            result = controller.query_battery() => match result {
                Ok(percent) => {
                    tracing::debug!(percent, level = ?BatteryLevel::from_percent(percent), "Battery polled");
                }
                Err(CatPrinterError::NotConnected) => {
                    tracing::info!("Battery monitor stopped (disconnected)");
                    return;
                }
                Err(e) => tracing::warn!("Failed to update battery status: {e}"),
            },
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Battery monitor stopped");
                return;
            }
            _ = controller.disconnected() => {
                tracing::info!("Battery monitor stopped (disconnected)");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
