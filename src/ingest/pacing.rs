//! Admission control and backpressure between batches.

use std::{
    hint::black_box,
    time::{Duration, Instant},
};

use crate::metrics::MemoryStatus;
use crate::settings::PacingSettings;

/// Batch size for the next batch. It only ever shrinks: by a quarter under
/// elevated pressure and by half under critical pressure, never below one.
pub fn next_batch_size(current: usize, status: &MemoryStatus) -> usize {
    let current = current.max(1);
    if status.is_critical_memory {
        (current / 2).max(1)
    } else if status.is_low_memory {
        (current * 3 / 4).max(1)
    } else {
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseDecision {
    pub duration: Duration,
    /// Drop resident buffers and ask the host to reclaim memory.
    pub cleanup_hint: bool,
}

pub fn smart_pause(status: &MemoryStatus, settings: &PacingSettings) -> PauseDecision {
    let (millis, cleanup_hint) = if status.is_critical_memory {
        (settings.critical_pause_ms, true)
    } else if status.is_low_memory {
        (settings.low_memory_pause_ms, false)
    } else {
        (settings.base_pause_ms, false)
    };

    PauseDecision {
        duration: Duration::from_millis(millis),
        cleanup_hint,
    }
}

/// Times a yield back to the scheduler plus a trivial piece of work. A slow
/// result means the runtime is starved. Heuristic: unrelated host stalls can
/// also trip it.
pub async fn probe_foreground_latency() -> Duration {
    let started = Instant::now();
    tokio::task::yield_now().await;
    black_box((0..64u64).fold(0u64, |acc, n| acc.wrapping_add(n)));
    started.elapsed()
}

pub fn is_safe_to_continue(
    status: &MemoryStatus,
    probe_latency: Duration,
    settings: &PacingSettings,
) -> bool {
    !status.is_critical_memory && probe_latency < Duration::from_millis(settings.probe_threshold_ms)
}
