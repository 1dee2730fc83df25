use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use image::ImageFormat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TransportError;
use crate::settings::TransportSettings;

/// A file ready for upload, after compression or fallback.
#[derive(Debug, Clone)]
pub struct CompressedFile {
    pub index: usize,
    pub name: String,
    pub bytes: Vec<u8>,
    pub format: Option<ImageFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub url: String,
    pub filename: String,
    pub id: String,
}

/// Moves one file to the remote store. Implementations own any retry policy.
pub trait UploadTransport: Send + Sync {
    fn send(
        &self,
        file: &CompressedFile,
    ) -> impl Future<Output = Result<UploadReceipt, TransportError>> + Send;
}

/// Writes uploads into a local directory, one uniquely named file each.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    out_dir: PathBuf,
}

impl DirectoryTransport {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl UploadTransport for DirectoryTransport {
    fn send(
        &self,
        file: &CompressedFile,
    ) -> impl Future<Output = Result<UploadReceipt, TransportError>> + Send {
        let id = Uuid::new_v4().to_string();
        let filename = stored_name(&file.name, file.format, &id);
        let path = self.out_dir.join(&filename);
        let out_dir = self.out_dir.clone();
        let bytes = file.bytes.clone();

        async move {
            tokio::fs::create_dir_all(&out_dir)
                .await
                .map_err(|err| io_error(&out_dir, err))?;
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|err| io_error(&path, err))?;

            Ok(UploadReceipt {
                url: format!("file://{}", path.display()),
                filename,
                id,
            })
        }
    }
}

fn io_error(path: &Path, err: std::io::Error) -> TransportError {
    let message = format!("{}: {err}", path.display());
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => TransportError::Rejected(message),
        _ => TransportError::Network(message),
    }
}

/// `<stem>-<short id>.<ext>`, flattened so nested source paths stay inside
/// the output directory.
fn stored_name(name: &str, format: Option<ImageFormat>, id: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| String::from("upload"));
    let extension = match format {
        Some(ImageFormat::Jpeg) => String::from("jpg"),
        _ => path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .or_else(|| {
                format.and_then(|format| format.extensions_str().first().map(|ext| ext.to_string()))
            })
            .unwrap_or_else(|| String::from("bin")),
    };
    let short_id = id.split('-').next().unwrap_or(id);
    format!("{stem}-{short_id}.{extension}")
}

/// Wraps a transport with bounded attempts, a per-attempt timeout and
/// exponential backoff with jitter. Rejections are not retried.
pub struct RetryingTransport<T> {
    inner: T,
    settings: TransportSettings,
    rng: Mutex<StdRng>,
}

impl<T: UploadTransport> RetryingTransport<T> {
    pub fn new(inner: T, settings: TransportSettings) -> Self {
        Self {
            inner,
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .settings
            .backoff_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let jitter_max = self.settings.backoff_ms / 2;
        let jitter = if jitter_max == 0 {
            0
        } else {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(0..=jitter_max)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

impl<T: UploadTransport> UploadTransport for RetryingTransport<T> {
    fn send(
        &self,
        file: &CompressedFile,
    ) -> impl Future<Output = Result<UploadReceipt, TransportError>> + Send {
        async move {
            let attempts = self.settings.attempts.max(1);
            let timeout = Duration::from_millis(self.settings.attempt_timeout_ms);
            let mut attempt = 1;

            loop {
                let result = match tokio::time::timeout(timeout, self.inner.send(file)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(timeout)),
                };

                match result {
                    Ok(receipt) => return Ok(receipt),
                    Err(err) if !err.is_retryable() || attempt >= attempts => {
                        return Err(err);
                    }
                    Err(err) => {
                        let delay = self.backoff(attempt);
                        log::debug!(
                            "{}: attempt {attempt}/{attempts} failed ({err}), retrying in {delay:?}",
                            file.name
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
