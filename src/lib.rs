pub mod capacity;
pub mod cli;
pub mod compression;
pub mod db;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod session;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod viewport;
pub mod watchdog;

use std::process::ExitCode;

use clap::Parser;

pub use error::{IngestError, IngestResult, TransportError};

/// Controller, watchdog, memory poller and overlay ticker all share this one
/// thread, so a stalled foreground shows up as watchdog drift. Compression
/// still runs on the blocking pool.
fn foreground_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

pub fn run() -> ExitCode {
    utils::init_logging();
    let cli = cli::Cli::parse();

    let runtime = match foreground_runtime() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(cli)) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn spawned_tasks_wait_for_a_stalled_foreground() {
        let runtime = foreground_runtime().unwrap();
        let (started, ran_at) = runtime.block_on(async {
            let started = Instant::now();
            let task = tokio::spawn(async { Instant::now() });
            std::thread::sleep(Duration::from_millis(50));
            (started, task.await.unwrap())
        });
        assert!(ran_at.duration_since(started) >= Duration::from_millis(50));
    }

    #[test]
    fn blocking_work_still_runs_off_the_foreground() {
        let runtime = foreground_runtime().unwrap();
        let _guard = runtime.enter();
        let foreground = std::thread::current().id();
        let worker = runtime
            .block_on(tokio::task::spawn_blocking(|| std::thread::current().id()))
            .unwrap();
        assert_ne!(worker, foreground);
    }
}
