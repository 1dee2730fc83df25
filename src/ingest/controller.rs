use std::{sync::Arc, time::Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::capacity::{CapacityProfiler, DeviceCapacity};
use crate::compression::{CompressionOutcome, CompressionPool, WorkerOutput};
use crate::error::IngestResult;
use crate::metrics::{MemoryMonitor, MemoryStatus};
use crate::session::{SessionTicket, UploadGuard};
use crate::settings::IngestSettings;
use crate::telemetry::HostTelemetry;
use crate::watchdog::Watchdog;

use super::pacing::{is_safe_to_continue, next_batch_size, probe_foreground_latency, smart_pause};
use super::{
    CompressedFile, CompressionReport, FileSource, IngestPhase, IngestSummary, ItemReport,
    UploadReport, UploadTransport,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub type CleanupHook = Arc<dyn Fn() + Send + Sync>;

/// Drives one ingestion session at a time: profiles the host, compresses
/// and uploads in shrinking batches, and pauses between batches according to
/// memory pressure.
pub struct IngestController<T> {
    telemetry: Arc<dyn HostTelemetry>,
    transport: T,
    guard: UploadGuard,
    settings: IngestSettings,
    monitor: MemoryMonitor,
    phase_tx: watch::Sender<IngestPhase>,
    cleanup_hook: Option<CleanupHook>,
}

enum Flow {
    Continue,
    Cancelled,
}

impl<T: UploadTransport> IngestController<T> {
    pub fn new(
        telemetry: Arc<dyn HostTelemetry>,
        transport: T,
        guard: UploadGuard,
        settings: IngestSettings,
    ) -> IngestResult<Self> {
        settings.validate()?;
        let (phase_tx, _) = watch::channel(IngestPhase::Idle);
        let monitor = MemoryMonitor::new(Arc::clone(&telemetry), settings.memory.clone());
        Ok(Self {
            telemetry,
            transport,
            guard,
            settings,
            monitor,
            phase_tx,
            cleanup_hook: None,
        })
    }

    /// Called whenever critical memory forces a cleanup between batches.
    pub fn with_cleanup_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleanup_hook = Some(Arc::new(hook));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn guard(&self) -> &UploadGuard {
        &self.guard
    }

    /// Memory readings taken for this controller, polled in the background
    /// while a session runs.
    pub fn memory_monitor(&self) -> &MemoryMonitor {
        &self.monitor
    }

    pub fn phase(&self) -> IngestPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<IngestPhase> {
        self.phase_tx.subscribe()
    }

    /// Cancels the running session. Items already uploaded stay uploaded.
    pub async fn cancel(&self) {
        self.guard.cancel_upload().await;
    }

    /// Runs a whole session over `source`. Per-item failures end up in the
    /// summary; only an invalid or conflicting start is an error.
    pub async fn run(&self, source: Arc<dyn FileSource>) -> IngestResult<IngestSummary> {
        let total_files = source.len();
        let ticket = self.guard.start_upload(total_files).await?;
        let started = Instant::now();
        self.set_phase(IngestPhase::Profiling);

        let capacity = CapacityProfiler::new(self.telemetry.as_ref()).profile();
        let mut summary = IngestSummary {
            total_files,
            final_batch_size: capacity.recommended_batch_size,
            ..IngestSummary::default()
        };
        if total_files > capacity.estimated_max_safe_items {
            log_warn!(
                "{total_files} files exceeds the safe estimate of {} for this device; continuing with smaller pauses",
                capacity.estimated_max_safe_items
            );
            summary.exceeded_safe_capacity = true;
        }

        self.monitor.start_polling().await;

        let mut watchdog = Watchdog::new(self.settings.watchdog.clone());
        let watchdog_guard = self.guard.clone();
        watchdog.start(move |responsive| watchdog_guard.set_ui_responsive(responsive));

        let flow = self.process(&source, &capacity, &ticket, &mut summary).await;

        watchdog.stop();
        if let Err(err) = self.monitor.stop_polling().await {
            log_error!("Failed to stop memory poller: {err:#}");
        }

        summary.elapsed = started.elapsed();
        match flow {
            Flow::Continue => {
                self.guard.finish_session(&ticket).await;
                self.set_phase(IngestPhase::Finished);
                log_info!(
                    "ingest finished: {} uploaded, {} failed, {} batches in {:.1}s",
                    summary.uploaded,
                    summary.failed.len(),
                    summary.batches,
                    summary.elapsed.as_secs_f64()
                );
                Ok(summary)
            }
            Flow::Cancelled => {
                self.guard.cancel_session(&ticket).await;
                summary.cancelled = true;
                self.set_phase(IngestPhase::Cancelled);
                log_info!(
                    "ingest cancelled after {} of {} files",
                    summary.items.len(),
                    total_files
                );
                Ok(summary)
            }
        }
    }

    async fn process(
        &self,
        source: &Arc<dyn FileSource>,
        capacity: &DeviceCapacity,
        ticket: &SessionTicket,
        summary: &mut IngestSummary,
    ) -> Flow {
        let cancel_token = ticket.cancel_token();
        let monitor = &self.monitor;
        let total_files = source.len();
        let pool = CompressionPool::new(
            self.settings.worker_count(capacity.logical_cores),
            self.settings.compression.clone(),
        );

        let mut readings = monitor.subscribe();
        let mut batch_size = self.adjust_batch_size(capacity.recommended_batch_size, &monitor.sample());
        readings.mark_unchanged();
        let mut next_index = 0;

        while next_index < total_files {
            let mut clamped_in_batch = false;
            if cancel_token.is_cancelled() {
                return Flow::Cancelled;
            }

            let end = (next_index + batch_size).min(total_files);
            let batch_number = summary.batches + 1;
            let batch_total = summary.batches + (total_files - next_index).div_ceil(batch_size);

            self.set_phase(IngestPhase::Compressing);
            self.guard
                .update_progress(
                    progress_percent(next_index, total_files),
                    &format!("Compressing batch {batch_number} of {batch_total}"),
                    next_index,
                )
                .await;
            log_debug!("batch {batch_number}: files {next_index}..{end} with batch size {batch_size}");

            let pending = pool.submit_batch(source, next_index..end);
            self.set_phase(IngestPhase::Uploading);

            for item in pending {
                if !clamped_in_batch && readings.has_changed().unwrap_or(false) {
                    let status = *readings.borrow_and_update();
                    if status.is_low_memory {
                        batch_size = self.adjust_batch_size(batch_size, &status);
                        summary.final_batch_size = batch_size;
                        clamped_in_batch = true;
                    }
                }

                let index = item.index;
                let name = item.name.clone();

                let output = tokio::select! {
                    output = item.wait() => output,
                    _ = cancel_token.cancelled() => {
                        log_debug!("discarding in-flight compression results for batch {batch_number}");
                        return Flow::Cancelled;
                    }
                };

                let report = match output {
                    WorkerOutput::Ready(image) => {
                        let compression = match image.outcome {
                            CompressionOutcome::Compressed { original_bytes } => {
                                CompressionReport::Compressed {
                                    original_bytes,
                                    compressed_bytes: image.bytes.len(),
                                }
                            }
                            CompressionOutcome::Fallback { ref reason } => {
                                CompressionReport::Fallback {
                                    reason: reason.clone(),
                                }
                            }
                        };
                        let file = CompressedFile {
                            index,
                            name: name.clone(),
                            bytes: image.bytes,
                            format: image.format,
                        };

                        let upload = tokio::select! {
                            result = self.transport.send(&file) => result,
                            _ = cancel_token.cancelled() => return Flow::Cancelled,
                        };
                        let upload = match upload {
                            Ok(receipt) => UploadReport::Uploaded { receipt },
                            Err(err) => {
                                log_warn!("{name}: upload failed: {err}");
                                UploadReport::Failed {
                                    reason: err.to_string(),
                                }
                            }
                        };

                        ItemReport {
                            index,
                            name: name.clone(),
                            compression,
                            upload,
                        }
                    }
                    WorkerOutput::LoadFailed(reason) => {
                        log_warn!("{name}: could not be read: {reason}");
                        ItemReport {
                            index,
                            name: name.clone(),
                            compression: CompressionReport::Unreadable { reason },
                            upload: UploadReport::Skipped,
                        }
                    }
                };
                summary.record(report);

                let processed = summary.items.len();
                self.guard
                    .update_progress(
                        progress_percent(processed, total_files),
                        &format!("Uploading {name} ({processed}/{total_files})"),
                        processed,
                    )
                    .await;
            }

            summary.batches += 1;
            next_index = end;
            if next_index >= total_files {
                break;
            }

            let status = monitor.sample();
            readings.mark_unchanged();
            if !clamped_in_batch {
                batch_size = self.adjust_batch_size(batch_size, &status);
            }
            summary.final_batch_size = batch_size;

            if let Flow::Cancelled = self.pause(status, monitor, cancel_token, summary).await {
                return Flow::Cancelled;
            }
            // Samples taken while pausing were already acted on.
            readings.mark_unchanged();
        }

        summary.final_batch_size = batch_size;
        Flow::Continue
    }

    fn adjust_batch_size(&self, current: usize, status: &MemoryStatus) -> usize {
        let next = next_batch_size(current, status);
        if status.is_critical_memory {
            log_warn!(
                "critical memory at {:.1}%, batch size {current} -> {next}",
                status.usage_percentage
            );
        } else if next < current {
            log_info!(
                "memory at {:.1}%, batch size {current} -> {next}",
                status.usage_percentage
            );
        }
        next
    }

    /// Sleeps between batches, then keeps sleeping until memory is no longer
    /// critical and the foreground probe is fast again.
    async fn pause(
        &self,
        mut status: MemoryStatus,
        monitor: &MemoryMonitor,
        cancel_token: &CancellationToken,
        summary: &mut IngestSummary,
    ) -> Flow {
        self.set_phase(IngestPhase::Paused);
        let pacing = &self.settings.pacing;
        let mut retries: u32 = 0;

        loop {
            let decision = smart_pause(&status, pacing);
            if decision.cleanup_hint {
                summary.cleanup_hints += 1;
                if let Some(hook) = &self.cleanup_hook {
                    hook();
                }
            }
            summary.pauses += 1;

            tokio::select! {
                _ = tokio::time::sleep(decision.duration) => {}
                _ = cancel_token.cancelled() => return Flow::Cancelled,
            }
            self.guard.report_activity().await;

            status = monitor.sample();
            let latency = probe_foreground_latency().await;
            if is_safe_to_continue(&status, latency, pacing) {
                return Flow::Continue;
            }

            retries += 1;
            if let Some(max) = pacing.max_pause_retries {
                if retries >= max {
                    log_warn!("host still under pressure after {retries} pauses, continuing anyway");
                    return Flow::Continue;
                }
            }
            log_debug!(
                "not safe to continue (memory {:.1}%, probe {:?}), pausing again",
                status.usage_percentage,
                latency
            );
        }
    }

    fn set_phase(&self, phase: IngestPhase) {
        let previous = self.phase_tx.send_replace(phase);
        if previous != phase {
            log_debug!("ingest phase {previous:?} -> {phase:?}");
        }
    }
}

fn progress_percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    processed as f64 / total as f64 * 100.0
}
