use std::{
    future::Future,
    io::Cursor,
    sync::{Arc, Mutex},
    time::Duration,
};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use photodrop_lib::{
    ingest::{
        CompressedFile, CompressionReport, DirectorySource, DirectoryTransport, FileSource,
        IngestController, IngestPhase, MemorySource, UploadReceipt, UploadReport, UploadTransport,
    },
    session::{UploadGuard, UploadSession},
    settings::{IngestSettings, PacingSettings},
    store::{MemorySessionStore, SessionStore},
    telemetry::StaticTelemetry,
    TransportError,
};

fn noisy_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_add(1);
    let image = RgbImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [_, r, g, b] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn settings() -> IngestSettings {
    IngestSettings {
        pacing: PacingSettings {
            base_pause_ms: 1,
            low_memory_pause_ms: 2,
            critical_pause_ms: 5,
            probe_threshold_ms: 1_000,
            max_pause_retries: Some(1),
        },
        workers: Some(3),
        ..IngestSettings::default()
    }
}

fn desktop() -> StaticTelemetry {
    StaticTelemetry::new(Some(8), Some(8.0), false)
}

fn image_source(count: usize) -> Arc<dyn FileSource> {
    Arc::new(MemorySource::new(
        (0..count)
            .map(|i| (format!("photo-{i:03}.png"), noisy_png(48, 48, i as u32)))
            .collect(),
    ))
}

/// Records what the session looked like at every send, and fails the names it
/// is told to fail.
struct RecordingTransport {
    guard: UploadGuard,
    fail_names: Vec<String>,
    sends: Mutex<Vec<(usize, usize)>>,
}

impl RecordingTransport {
    fn new(guard: UploadGuard, fail_names: &[&str]) -> Self {
        Self {
            guard,
            fail_names: fail_names.iter().map(|name| name.to_string()).collect(),
            sends: Mutex::new(Vec::new()),
        }
    }

    fn sends(&self) -> Vec<(usize, usize)> {
        self.sends.lock().unwrap().clone()
    }
}

impl UploadTransport for RecordingTransport {
    fn send(
        &self,
        file: &CompressedFile,
    ) -> impl Future<Output = Result<UploadReceipt, TransportError>> + Send {
        let index = file.index;
        let name = file.name.clone();
        async move {
            let processed = self.guard.upload_state().await.files_processed;
            self.sends.lock().unwrap().push((index, processed));
            if self.fail_names.contains(&name) {
                return Err(TransportError::Network(format!("{name} dropped")));
            }
            Ok(UploadReceipt {
                url: format!("mem://{name}"),
                filename: name,
                id: index.to_string(),
            })
        }
    }
}

fn guard(store: Arc<MemorySessionStore>) -> UploadGuard {
    UploadGuard::new(store, Default::default())
}

#[tokio::test]
async fn uploads_follow_submission_order_with_monotonic_progress() {
    let store = Arc::new(MemorySessionStore::new());
    let guard = guard(store.clone());
    let transport = RecordingTransport::new(guard.clone(), &[]);
    let controller =
        IngestController::new(Arc::new(desktop()), transport, guard.clone(), settings()).unwrap();

    let summary = controller.run(image_source(70)).await.unwrap();

    assert_eq!(summary.uploaded, 70);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.batches, 3);
    assert_eq!(
        summary.items.iter().map(|item| item.index).collect::<Vec<_>>(),
        (0..70).collect::<Vec<_>>()
    );

    // Each send happens after exactly the preceding items were accounted.
    let sends = controller.transport().sends();
    assert_eq!(sends.len(), 70);
    for (position, (index, processed)) in sends.iter().enumerate() {
        assert_eq!(*index, position);
        assert_eq!(*processed, position);
    }

    assert_eq!(controller.phase(), IngestPhase::Finished);
    let finished = guard.upload_state().await;
    assert!(!finished.is_active);
    assert_eq!(finished.progress_percent, 100.0);
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_uploads_are_reported_without_stopping_the_batch() {
    let guard = guard(Arc::new(MemorySessionStore::new()));
    let transport = RecordingTransport::new(guard.clone(), &["photo-001.png", "photo-004.png"]);
    let controller =
        IngestController::new(Arc::new(desktop()), transport, guard, settings()).unwrap();

    let summary = controller.run(image_source(6)).await.unwrap();

    assert_eq!(summary.uploaded, 4);
    let failed: Vec<_> = summary.failed.iter().map(|item| item.index).collect();
    assert_eq!(failed, vec![1, 4]);
    assert!(summary.failed[0].reason.contains("photo-001.png dropped"));
    assert!(!summary.all_failed());
    assert!(summary
        .items
        .iter()
        .all(|item| matches!(item.compression, CompressionReport::Compressed { .. })));
}

#[tokio::test]
async fn every_item_failing_is_visible_to_the_caller() {
    let guard = guard(Arc::new(MemorySessionStore::new()));
    let transport = RecordingTransport::new(guard.clone(), &["photo-000.png", "photo-001.png"]);
    let controller =
        IngestController::new(Arc::new(desktop()), transport, guard, settings()).unwrap();

    let summary = controller.run(image_source(2)).await.unwrap();
    assert!(summary.all_failed());
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn critical_memory_throttles_and_requests_cleanup() {
    let guard = guard(Arc::new(MemorySessionStore::new()));
    let transport = RecordingTransport::new(guard.clone(), &[]);
    let telemetry = desktop().with_usage_percentages([92.0]);
    let controller = IngestController::new(Arc::new(telemetry), transport, guard, settings())
        .unwrap()
        .with_cleanup_hook(|| {});

    let summary = controller.run(image_source(40)).await.unwrap();

    assert_eq!(summary.uploaded, 40);
    assert!(summary.final_batch_size < 30);
    assert!(summary.final_batch_size >= 1);
    assert!(summary.cleanup_hints >= 1);
    assert!(summary.pauses >= summary.batches - 1);
}

/// Cancels the session from inside the transport on the given index, then
/// never completes that upload.
struct CancellingTransport {
    guard: UploadGuard,
    cancel_at: usize,
    sent: Mutex<Vec<usize>>,
}

impl UploadTransport for CancellingTransport {
    fn send(
        &self,
        file: &CompressedFile,
    ) -> impl Future<Output = Result<UploadReceipt, TransportError>> + Send {
        let index = file.index;
        async move {
            self.sent.lock().unwrap().push(index);
            if index == self.cancel_at {
                self.guard.cancel_upload().await;
                std::future::pending::<()>().await;
            }
            Ok(UploadReceipt {
                url: String::new(),
                filename: index.to_string(),
                id: index.to_string(),
            })
        }
    }
}

#[tokio::test]
async fn cancel_mid_batch_discards_the_rest_and_resets_the_session() {
    let store = Arc::new(MemorySessionStore::new());
    let guard = guard(store.clone());
    let transport = CancellingTransport {
        guard: guard.clone(),
        cancel_at: 3,
        sent: Mutex::new(Vec::new()),
    };
    let controller =
        IngestController::new(Arc::new(desktop()), transport, guard.clone(), settings()).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), controller.run(image_source(12)))
        .await
        .expect("cancelled run never returned")
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.items.len(), 3);
    assert_eq!(*controller.transport().sent.lock().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(controller.phase(), IngestPhase::Cancelled);
    assert_eq!(guard.upload_state().await, UploadSession::default());
    assert!(store.load().await.unwrap().is_none());

    // The guard accepts a fresh session afterwards.
    guard.start_upload(1).await.unwrap();
    guard.cancel_upload().await;
}

#[tokio::test]
async fn directory_ingest_writes_every_image() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..5 {
        std::fs::write(
            input.path().join(format!("img-{i}.png")),
            noisy_png(64, 32, i),
        )
        .unwrap();
    }
    std::fs::write(input.path().join("broken.jpg"), b"not really a jpeg").unwrap();
    std::fs::write(input.path().join("readme.txt"), b"ignored").unwrap();

    let source = DirectorySource::scan(input.path()).unwrap();
    assert_eq!(source.len(), 6);

    let guard = guard(Arc::new(MemorySessionStore::new()));
    let transport = DirectoryTransport::new(output.path().to_path_buf());
    let controller =
        IngestController::new(Arc::new(desktop()), transport, guard, settings()).unwrap();

    let summary = controller.run(Arc::new(source)).await.unwrap();
    assert_eq!(summary.uploaded, 6);
    assert_eq!(summary.compression_fallbacks, 1);

    let broken = &summary.items[0];
    assert_eq!(broken.name, "broken.jpg");
    assert!(matches!(broken.compression, CompressionReport::Fallback { .. }));
    match &broken.upload {
        UploadReport::Uploaded { receipt } => assert!(receipt.filename.ends_with(".jpg")),
        other => panic!("unexpected upload report {other:?}"),
    }

    let written = std::fs::read_dir(output.path()).unwrap().count();
    assert_eq!(written, 6);
}
