use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::error::{IngestError, IngestResult};
use crate::settings::OverlaySettings;
use crate::store::SessionStore;
use crate::utils::debug_mode;

use super::{estimate_remaining, evaluate_overlay, OverlayDecision, UploadSession};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Owns the single upload session and the liveness flags the UI reads.
///
/// Construct one per host and hand clones to whoever needs it; clones share
/// state. Every mutation goes through the same lock, which is also held while
/// the persisted mirror is written, so the mirror never runs ahead of or
/// behind the in-memory session.
///
/// Responsiveness combines two independent signals: the watchdog feed and
/// the overlay ticker's inactivity verdict. The UI counts as responsive only
/// while both are healthy and no emergency was forced.
#[derive(Clone)]
pub struct UploadGuard {
    inner: Arc<GuardInner>,
}

/// Identifies one session opened by `start_upload`. Terminal calls made with
/// a ticket only touch that session, never a later one.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    generation: u64,
    cancel_token: CancellationToken,
}

impl SessionTicket {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

struct GuardInner {
    state: Mutex<GuardState>,
    store: Arc<dyn SessionStore>,
    settings: OverlaySettings,
    overlay_shown: AtomicBool,
    overlay_forced: AtomicBool,
    activity_ok: AtomicBool,
    watchdog_ok: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    heartbeat_every_ticks: u32,
}

struct GuardState {
    session: UploadSession,
    cancel_token: CancellationToken,
    generation: u64,
}

impl UploadGuard {
    pub fn new(store: Arc<dyn SessionStore>, settings: OverlaySettings) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                state: Mutex::new(GuardState {
                    session: UploadSession::default(),
                    cancel_token: CancellationToken::new(),
                    generation: 0,
                }),
                store,
                settings,
                overlay_shown: AtomicBool::new(false),
                overlay_forced: AtomicBool::new(false),
                activity_ok: AtomicBool::new(true),
                watchdog_ok: AtomicBool::new(true),
                ticker: Mutex::new(None),
                heartbeat_every_ticks: if debug_mode() { 1 } else { 10 },
            }),
        }
    }

    /// Opens a session for `total_files` files. Rejected with no state change
    /// when `total_files` is zero or a session is already running.
    pub async fn start_upload(&self, total_files: usize) -> IngestResult<SessionTicket> {
        if total_files == 0 {
            return Err(IngestError::InvalidConfiguration(
                "total_files must be greater than zero".into(),
            ));
        }

        let ticket = {
            let mut state = self.inner.state.lock().await;
            if state.session.is_active {
                return Err(IngestError::SessionActive);
            }

            state.session = UploadSession::begin(total_files, now_ms());
            state.cancel_token = CancellationToken::new();
            state.generation += 1;
            self.inner.reset_flags();
            self.inner.mirror(&state.session).await;
            SessionTicket {
                generation: state.generation,
                cancel_token: state.cancel_token.clone(),
            }
        };

        log_info!("upload session started for {total_files} files");
        self.spawn_ticker().await;
        Ok(ticket)
    }

    /// Records progress. A progress tick is proof of liveness, so it also
    /// clears the overlay (forced or not) and marks the UI responsive.
    /// Ignored when idle.
    pub async fn update_progress(&self, progress: f64, step_label: &str, files_processed: usize) {
        let mut state = self.inner.state.lock().await;
        if !state.session.is_active {
            log_debug!("progress update ignored outside a session: {step_label}");
            return;
        }

        state
            .session
            .apply_progress(progress, step_label, files_processed, now_ms());
        self.inner.reset_flags();
        self.inner.mirror(&state.session).await;
    }

    /// Restarts the inactivity timer. An overlay raised by inactivity comes
    /// down; a forced one stays until progress arrives.
    pub async fn report_activity(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.session.is_active {
            return;
        }
        state.session.touch(now_ms());
        self.inner.apply_decision(OverlayDecision::Normal, Duration::ZERO);
        self.inner.mirror(&state.session).await;
    }

    /// Completes the session and returns its final snapshot.
    pub async fn finish_upload(&self) -> UploadSession {
        let mut state = self.inner.state.lock().await;
        self.finish_locked(&mut state).await
    }

    /// Like `finish_upload`, but leaves a newer session alone.
    pub async fn finish_session(&self, ticket: &SessionTicket) -> UploadSession {
        let mut state = self.inner.state.lock().await;
        if state.generation != ticket.generation {
            log_debug!("session {} already replaced, not finishing", ticket.generation);
            return state.session.clone();
        }
        self.finish_locked(&mut state).await
    }

    /// Stops the session and resets it to the all-zero state. Work already
    /// handed to the transport is not reconciled.
    pub async fn cancel_upload(&self) {
        let mut state = self.inner.state.lock().await;
        self.cancel_locked(&mut state).await;
    }

    /// Like `cancel_upload`, but leaves a newer session alone.
    pub async fn cancel_session(&self, ticket: &SessionTicket) {
        ticket.cancel_token.cancel();
        let mut state = self.inner.state.lock().await;
        if state.generation != ticket.generation {
            log_debug!("session {} already replaced, not cancelling", ticket.generation);
            return;
        }
        self.cancel_locked(&mut state).await;
    }

    /// Surfaces the overlay immediately, for callers that detect trouble on
    /// their own. Only a progress update clears it.
    pub fn force_emergency_mode(&self) {
        log_warn!("emergency overlay forced");
        self.inner.overlay_forced.store(true, Ordering::SeqCst);
    }

    pub async fn upload_state(&self) -> UploadSession {
        self.inner.state.lock().await.session.clone()
    }

    pub async fn time_elapsed(&self) -> Duration {
        self.inner.state.lock().await.session.elapsed(now_ms())
    }

    pub async fn estimated_time_remaining(&self) -> Option<Duration> {
        let state = self.inner.state.lock().await;
        if !state.session.is_active {
            return None;
        }
        estimate_remaining(
            state.session.elapsed(now_ms()),
            state.session.progress_percent,
        )
    }

    pub fn show_emergency_overlay(&self) -> bool {
        self.inner.overlay_forced.load(Ordering::SeqCst)
            || self.inner.overlay_shown.load(Ordering::SeqCst)
    }

    pub fn is_ui_responsive(&self) -> bool {
        self.inner.watchdog_ok.load(Ordering::SeqCst)
            && self.inner.activity_ok.load(Ordering::SeqCst)
            && !self.inner.overlay_forced.load(Ordering::SeqCst)
    }

    /// Watchdog feed. Only the watchdog's half of the responsiveness signal
    /// is touched; the inactivity verdict is kept separately.
    pub fn set_ui_responsive(&self, responsive: bool) {
        let previous = self.inner.watchdog_ok.swap(responsive, Ordering::SeqCst);
        if previous != responsive {
            log_debug!("watchdog responsive: {responsive}");
        }
    }

    /// Token cancelled by `cancel_upload` for the current session.
    pub async fn cancellation_token(&self) -> CancellationToken {
        self.inner.state.lock().await.cancel_token.clone()
    }

    async fn finish_locked(&self, state: &mut GuardState) -> UploadSession {
        if state.session.is_active {
            state.session.finish(now_ms());
            self.inner.discard_mirror().await;
            log_info!(
                "upload session finished: {}/{} files",
                state.session.files_processed,
                state.session.total_files
            );
        }
        self.cancel_ticker().await;
        self.inner.reset_flags();
        state.session.clone()
    }

    async fn cancel_locked(&self, state: &mut GuardState) {
        state.cancel_token.cancel();
        let was_active = state.session.is_active;
        state.session = UploadSession::default();
        self.inner.discard_mirror().await;
        if was_active {
            log_info!("upload session cancelled");
        }
        self.cancel_ticker().await;
        self.inner.reset_flags();
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.inner.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let period = Duration::from_millis(self.inner.settings.check_interval_ms.max(1));
        let weak = Arc::downgrade(&self.inner);
        *ticker_guard = Some(tokio::spawn(overlay_ticker(weak, period)));
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.inner.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

/// Holds only a weak reference so dropping every guard ends the task.
async fn overlay_ticker(weak: Weak<GuardInner>, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut ticks: u32 = 0;

    loop {
        interval.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };

        let (since_activity, is_active) = {
            let state = inner.state.lock().await;
            (
                state.session.since_last_activity(now_ms()),
                state.session.is_active,
            )
        };
        if !is_active {
            break;
        }

        inner.apply_decision(
            evaluate_overlay(since_activity, is_active, &inner.settings),
            since_activity,
        );

        ticks = ticks.wrapping_add(1);
        if ticks % inner.heartbeat_every_ticks == 0 {
            log_debug!(
                "overlay heartbeat: idle {:.1}s, overlay={}",
                since_activity.as_secs_f64(),
                inner.overlay_shown.load(Ordering::SeqCst)
            );
        }
    }
}

impl GuardInner {
    fn apply_decision(&self, decision: OverlayDecision, since_activity: Duration) {
        let show = decision == OverlayDecision::ShowOverlay;
        let was_shown = self.overlay_shown.swap(show, Ordering::SeqCst);
        if show && !was_shown {
            log_warn!(
                "no upload activity for {:.1}s, showing emergency overlay",
                since_activity.as_secs_f64()
            );
        } else if !show && was_shown {
            log_info!("upload activity resumed, emergency overlay cleared");
        }
        self.activity_ok
            .store(decision == OverlayDecision::Normal, Ordering::SeqCst);
    }

    fn reset_flags(&self) {
        self.overlay_shown.store(false, Ordering::SeqCst);
        self.overlay_forced.store(false, Ordering::SeqCst);
        self.activity_ok.store(true, Ordering::SeqCst);
        self.watchdog_ok.store(true, Ordering::SeqCst);
    }

    async fn mirror(&self, session: &UploadSession) {
        if let Err(err) = self.store.save(session.clone()).await {
            log_error!("Failed to persist upload session: {err:#}");
        }
    }

    async fn discard_mirror(&self) {
        if let Err(err) = self.store.clear().await {
            log_error!("Failed to clear persisted upload session: {err:#}");
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
