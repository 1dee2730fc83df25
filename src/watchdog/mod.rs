//! Cooperative-scheduling watchdog.
//!
//! The watchdog re-arms a short sleep on the runtime it was started on and
//! measures how late each wake-up is. When heavy synchronous work starves the
//! runtime, the watchdog's own timer fires late, so the drift is the signal and
//! no separate foreground probe is needed.

mod state;

pub use state::WatchdogState;

use std::{sync::Arc, time::Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::settings::WatchdogSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub type ResponsivenessCallback = Arc<dyn Fn(bool) + Send + Sync>;

pub struct Watchdog {
    settings: WatchdogSettings,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Watchdog {
    pub fn new(settings: WatchdogSettings) -> Self {
        Self {
            settings,
            handle: None,
            cancel_token: None,
        }
    }

    /// Starts ticking on the current runtime. A running watchdog is restarted.
    pub fn start<F>(&mut self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.stop();

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(watchdog_loop(
            self.settings.clone(),
            Arc::new(callback),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
    }

    /// Cancels the timer. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watchdog_loop(
    settings: WatchdogSettings,
    callback: ResponsivenessCallback,
    cancel_token: CancellationToken,
) {
    let interval = settings.interval();
    let threshold = settings.threshold();
    let mut state = WatchdogState::new(Instant::now());
    let mut reported_unresponsive = false;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel_token.cancelled() => {
                log_debug!("watchdog stopped");
                break;
            }
        }

        match state.observe(Instant::now(), threshold, settings.unresponsive_ticks) {
            Some(false) => {
                if !reported_unresponsive {
                    log_warn!(
                        "foreground loop starved for {} consecutive ticks",
                        state.consecutive_unresponsive_ticks
                    );
                }
                reported_unresponsive = true;
                callback(false);
            }
            Some(true) => {
                if reported_unresponsive {
                    log_debug!("foreground loop responsive again");
                }
                reported_unresponsive = false;
                callback(true);
            }
            None => {}
        }
    }
}
