mod types;

pub use types::{MemoryStatus, PressureLevel};

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::settings::MemorySettings;
use crate::telemetry::HostTelemetry;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Classifies host heap pressure. Sampling is a pure read; on hosts without
/// telemetry every sample is the zero status.
pub struct MemoryMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    telemetry: Arc<dyn HostTelemetry>,
    settings: MemorySettings,
    status_tx: watch::Sender<MemoryStatus>,
    poller: Mutex<Option<Poller>>,
}

struct Poller {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl MemoryMonitor {
    pub fn new(telemetry: Arc<dyn HostTelemetry>, settings: MemorySettings) -> Self {
        let (status_tx, _) = watch::channel(MemoryStatus::default());
        Self {
            inner: Arc::new(MonitorInner {
                telemetry,
                settings,
                status_tx,
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn sample(&self) -> MemoryStatus {
        self.inner.sample()
    }

    /// Most recent sample without touching the host.
    pub fn latest(&self) -> MemoryStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MemoryStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn settings(&self) -> &MemorySettings {
        &self.inner.settings
    }

    /// Starts the background poller. Calling it while already polling is a no-op.
    pub async fn start_polling(&self) {
        let mut poller = self.inner.poller.lock().await;
        if poller.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let interval = Duration::from_millis(self.inner.settings.poll_interval_ms.max(1));
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            interval,
            cancel_token.clone(),
        ));

        *poller = Some(Poller {
            handle,
            cancel_token,
        });
    }

    pub async fn stop_polling(&self) -> Result<()> {
        let Some(poller) = self.inner.poller.lock().await.take() else {
            return Ok(());
        };

        poller.cancel_token.cancel();
        poller
            .handle
            .await
            .context("memory poller task failed to join")
    }

    pub async fn is_polling(&self) -> bool {
        self.inner.poller.lock().await.is_some()
    }
}

impl Clone for MemoryMonitor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl MonitorInner {
    fn sample(&self) -> MemoryStatus {
        let status = MemoryStatus::from_usage(self.telemetry.heap_usage(), &self.settings);
        let previous = self.status_tx.send_replace(status);

        if status.level() != previous.level() {
            match status.level() {
                PressureLevel::Critical => log_warn!(
                    "memory critical: {:.1}% ({:.0}/{:.0} MB)",
                    status.usage_percentage,
                    status.used_mb,
                    status.total_mb
                ),
                PressureLevel::Elevated => log_warn!(
                    "memory elevated: {:.1}% ({:.0}/{:.0} MB)",
                    status.usage_percentage,
                    status.used_mb,
                    status.total_mb
                ),
                PressureLevel::Normal => {
                    log_info!("memory back to normal: {:.1}%", status.usage_percentage)
                }
            }
        }

        status
    }
}

async fn poll_loop(inner: Arc<MonitorInner>, interval: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = inner.sample();
                log_debug!("memory sample {:.1}%", status.usage_percentage);
            }
            _ = cancel_token.cancelled() => {
                log_debug!("memory poller shutting down");
                break;
            }
        }
    }
}
