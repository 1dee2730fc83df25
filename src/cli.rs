use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::capacity::CapacityProfiler;
use crate::db::Database;
use crate::ingest::{
    DirectorySource, DirectoryTransport, FileSource, IngestController, IngestSummary,
    RetryingTransport,
};
use crate::session::UploadGuard;
use crate::settings::SettingsStore;
use crate::store::{MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::telemetry::{HostTelemetry, SystemTelemetry};
use crate::viewport::{compute_window, DEFAULT_BUFFER_ROWS};

#[derive(Parser)]
#[command(
    name = "photodrop",
    version,
    about = "Memory-aware batch photo ingestion",
    long_about = "Compress and upload large photo collections in adaptive batches without starving the host."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compress every image under a directory and upload it into another.
    Ingest {
        /// Directory to scan for images.
        input: PathBuf,

        /// Directory receiving the uploaded files.
        #[arg(short, long)]
        out: PathBuf,

        /// Settings JSON file (created on first save, defaults when missing).
        #[arg(long, env = "PHOTODROP_SETTINGS")]
        settings: Option<PathBuf>,

        /// SQLite file mirroring the active session for other observers.
        #[arg(long, env = "PHOTODROP_STATE_DB")]
        state_db: Option<PathBuf>,
    },
    /// Print the virtualization window for a grid as JSON.
    Window {
        #[arg(long)]
        items: usize,

        #[arg(long)]
        item_height: f64,

        #[arg(long)]
        container_height: f64,

        #[arg(long)]
        container_width: f64,

        #[arg(long, default_value_t = 0.0)]
        scroll_top: f64,

        #[arg(long, default_value_t = DEFAULT_BUFFER_ROWS)]
        buffer_rows: usize,
    },
    /// Print this host's capacity rating as JSON.
    Profile,
}

pub async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Ingest {
            input,
            out,
            settings,
            state_db,
        } => ingest(input, out, settings, state_db).await,
        Command::Window {
            items,
            item_height,
            container_height,
            container_width,
            scroll_top,
            buffer_rows,
        } => {
            let window = compute_window(
                items,
                item_height,
                container_height,
                scroll_top,
                container_width,
                buffer_rows,
            );
            println!("{}", serde_json::to_string_pretty(&window)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Profile => {
            let telemetry = SystemTelemetry::new();
            let capacity = CapacityProfiler::new(&telemetry).profile();
            println!("{}", serde_json::to_string_pretty(&capacity)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn ingest(
    input: PathBuf,
    out: PathBuf,
    settings_path: Option<PathBuf>,
    state_db: Option<PathBuf>,
) -> Result<ExitCode> {
    let settings = match settings_path {
        Some(path) => SettingsStore::new(path)?.settings(),
        None => Default::default(),
    };

    let store: Arc<dyn SessionStore> = match state_db {
        Some(path) => Arc::new(SqliteSessionStore::new(Database::new(path)?)),
        None => Arc::new(MemorySessionStore::new()),
    };

    let source = DirectorySource::scan(&input)
        .with_context(|| format!("failed to scan {}", input.display()))?;
    if source.is_empty() {
        println!("No images found under {}", input.display());
        return Ok(ExitCode::SUCCESS);
    }

    let telemetry: Arc<dyn HostTelemetry> = Arc::new(SystemTelemetry::new());
    let transport = RetryingTransport::new(DirectoryTransport::new(out), settings.transport.clone());
    let guard = UploadGuard::new(store, settings.overlay.clone());
    let controller = IngestController::new(telemetry, transport, guard.clone(), settings)?;

    let interrupt_guard = guard.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling upload");
            interrupt_guard.cancel_upload().await;
        }
    });

    let result = controller.run(Arc::new(source)).await;
    interrupt.abort();
    let summary = result?;

    print_summary(&summary);
    if summary.all_failed() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(summary: &IngestSummary) {
    let status = if summary.cancelled { "cancelled" } else { "finished" };
    println!(
        "Ingest {status}: {} of {} uploaded, {} failed, {} sent uncompressed ({} batches, {:.1}s)",
        summary.uploaded,
        summary.total_files,
        summary.failed.len(),
        summary.compression_fallbacks,
        summary.batches,
        summary.elapsed.as_secs_f64()
    );
    if summary.exceeded_safe_capacity {
        println!("Warning: more files than this device is rated for");
    }
    for failed in &summary.failed {
        println!("  failed: {} ({})", failed.name, failed.reason);
    }
}
