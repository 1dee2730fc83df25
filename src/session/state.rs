use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The upload aggregate shown to the UI. Timestamps are Unix milliseconds so
/// the persisted mirror reads the same from any observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub is_active: bool,
    pub progress_percent: f64,
    pub current_step_label: String,
    pub files_processed: usize,
    pub total_files: usize,
    pub start_time: i64,
    pub last_activity_time: i64,
}

impl UploadSession {
    pub fn begin(total_files: usize, now_ms: i64) -> Self {
        Self {
            is_active: true,
            progress_percent: 0.0,
            current_step_label: String::from("Preparing upload"),
            files_processed: 0,
            total_files,
            start_time: now_ms,
            last_activity_time: now_ms,
        }
    }

    /// Applies a progress tick. Progress and the processed count only move
    /// forward, and the count never passes `total_files`.
    pub fn apply_progress(
        &mut self,
        progress: f64,
        step_label: &str,
        files_processed: usize,
        now_ms: i64,
    ) {
        let progress = if progress.is_nan() {
            self.progress_percent
        } else {
            progress.clamp(0.0, 100.0)
        };
        self.progress_percent = self.progress_percent.max(progress);
        self.files_processed = self
            .files_processed
            .max(files_processed.min(self.total_files));
        self.current_step_label = step_label.to_string();
        self.touch(now_ms);
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.last_activity_time = self.last_activity_time.max(now_ms);
    }

    pub fn finish(&mut self, now_ms: i64) {
        self.is_active = false;
        self.progress_percent = 100.0;
        self.files_processed = self.total_files;
        self.current_step_label = String::from("Upload complete");
        self.touch(now_ms);
    }

    pub fn elapsed(&self, now_ms: i64) -> Duration {
        if !self.is_active {
            return Duration::ZERO;
        }
        millis_between(self.start_time, now_ms)
    }

    pub fn since_last_activity(&self, now_ms: i64) -> Duration {
        millis_between(self.last_activity_time, now_ms)
    }
}

fn millis_between(earlier: i64, later: i64) -> Duration {
    Duration::from_millis(later.saturating_sub(earlier).max(0) as u64)
}

/// Linear extrapolation of the time left: `elapsed / progress * 100 - elapsed`.
/// Undefined until some progress has been made.
pub fn estimate_remaining(elapsed: Duration, progress_percent: f64) -> Option<Duration> {
    if progress_percent.is_nan() || progress_percent <= 0.0 {
        return None;
    }
    let elapsed_secs = elapsed.as_secs_f64();
    let remaining = elapsed_secs / progress_percent * 100.0 - elapsed_secs;
    Some(Duration::from_secs_f64(remaining.max(0.0)))
}
