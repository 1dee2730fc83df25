use std::{ops::Range, sync::Arc};

use tokio::{sync::Semaphore, task::JoinHandle};

use crate::ingest::FileSource;

use super::{compress, CompressedImage, CompressionPolicy};

#[derive(Debug)]
pub enum WorkerOutput {
    Ready(CompressedImage),
    /// The source could not produce the file's bytes.
    LoadFailed(String),
}

/// A submitted file whose compression may still be running.
pub struct PendingCompression {
    pub index: usize,
    pub name: String,
    handle: JoinHandle<WorkerOutput>,
}

impl PendingCompression {
    pub async fn wait(self) -> WorkerOutput {
        match self.handle.await {
            Ok(output) => output,
            Err(err) => WorkerOutput::LoadFailed(format!("compression worker failed: {err}")),
        }
    }
}

/// Runs file loading and compression on blocking threads, at most `workers`
/// at a time, so a large image never runs on the async runtime itself.
pub struct CompressionPool {
    permits: Arc<Semaphore>,
    policy: Arc<CompressionPolicy>,
    workers: usize,
}

impl CompressionPool {
    pub fn new(workers: usize, policy: CompressionPolicy) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            policy: Arc::new(policy),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queues every file in `range`. The returned handles are in submission
    /// order; workers may finish in any order.
    pub fn submit_batch(
        &self,
        source: &Arc<dyn FileSource>,
        range: Range<usize>,
    ) -> Vec<PendingCompression> {
        range
            .map(|index| {
                let name = source.name(index);
                let handle = tokio::spawn(run_worker(
                    Arc::clone(&self.permits),
                    Arc::clone(&self.policy),
                    Arc::clone(source),
                    index,
                    name.clone(),
                ));
                PendingCompression {
                    index,
                    name,
                    handle,
                }
            })
            .collect()
    }
}

async fn run_worker(
    permits: Arc<Semaphore>,
    policy: Arc<CompressionPolicy>,
    source: Arc<dyn FileSource>,
    index: usize,
    name: String,
) -> WorkerOutput {
    // The semaphore is never closed; a failed acquire only drops the bound.
    let _permit = permits.acquire_owned().await.ok();

    tokio::task::spawn_blocking(move || match source.load(index) {
        Ok(bytes) => WorkerOutput::Ready(compress(&name, bytes, &policy)),
        Err(err) => WorkerOutput::LoadFailed(format!("{err:#}")),
    })
    .await
    .unwrap_or_else(|err| WorkerOutput::LoadFailed(format!("compression worker panicked: {err}")))
}
