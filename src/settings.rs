use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::compression::CompressionPolicy;
use crate::error::IngestError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PacingSettings {
    pub base_pause_ms: u64,
    pub low_memory_pause_ms: u64,
    pub critical_pause_ms: u64,
    /// Foreground probe budget; a probe slower than this marks the host unsafe.
    pub probe_threshold_ms: u64,
    /// `None` keeps retrying an unsafe pause until it clears or the session is cancelled.
    pub max_pause_retries: Option<u32>,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            base_pause_ms: 10,
            low_memory_pause_ms: 100,
            critical_pause_ms: 500,
            probe_threshold_ms: 100,
            max_pause_retries: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    pub poll_interval_ms: u64,
    pub low_threshold_percent: f64,
    pub critical_threshold_percent: f64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            low_threshold_percent: 75.0,
            critical_threshold_percent: 90.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchdogSettings {
    pub interval_ms: u64,
    pub threshold_ms: u64,
    pub unresponsive_ticks: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            threshold_ms: 2_000,
            unresponsive_ticks: 2,
        }
    }
}

impl WatchdogSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlaySettings {
    pub inactivity_ms: u64,
    pub secondary_delay_ms: u64,
    pub check_interval_ms: u64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            inactivity_ms: 15_000,
            secondary_delay_ms: 10_000,
            check_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    pub attempts: u32,
    pub backoff_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 250,
            attempt_timeout_ms: 30_000,
        }
    }
}

/// Every tunable of the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    pub compression: CompressionPolicy,
    pub pacing: PacingSettings,
    pub memory: MemorySettings,
    pub watchdog: WatchdogSettings,
    pub overlay: OverlaySettings,
    pub transport: TransportSettings,
    /// Compression workers; defaults to the logical core count capped at 4.
    pub workers: Option<usize>,
}

const MAX_DEFAULT_WORKERS: usize = 4;

impl IngestSettings {
    pub fn validate(&self) -> Result<(), IngestError> {
        let invalid = |msg: &str| Err(IngestError::InvalidConfiguration(msg.to_string()));

        if self.compression.max_dimension == 0 {
            return invalid("compression.maxDimension must be greater than zero");
        }
        if self.compression.max_size_mb.is_nan() || self.compression.max_size_mb <= 0.0 {
            return invalid("compression.maxSizeMb must be greater than zero");
        }
        if self.compression.quality == 0 || self.compression.quality > 100 {
            return invalid("compression.quality must be within 1..=100");
        }
        if self.compression.min_quality == 0 || self.compression.min_quality > self.compression.quality {
            return invalid("compression.minQuality must be within 1..=quality");
        }
        if self.memory.low_threshold_percent >= self.memory.critical_threshold_percent {
            return invalid("memory.lowThresholdPercent must be below criticalThresholdPercent");
        }
        if self.memory.poll_interval_ms == 0 || self.watchdog.interval_ms == 0 {
            return invalid("poll intervals must be greater than zero");
        }
        if self.watchdog.unresponsive_ticks == 0 {
            return invalid("watchdog.unresponsiveTicks must be greater than zero");
        }
        if self.overlay.check_interval_ms == 0 {
            return invalid("overlay.checkIntervalMs must be greater than zero");
        }
        if self.transport.attempts == 0 {
            return invalid("transport.attempts must be greater than zero");
        }
        if self.workers == Some(0) {
            return invalid("workers must be greater than zero");
        }
        Ok(())
    }

    pub fn worker_count(&self, logical_cores: usize) -> usize {
        self.workers
            .unwrap_or_else(|| logical_cores.clamp(1, MAX_DEFAULT_WORKERS))
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<IngestSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing or unreadable JSON document falls
    /// back to defaults; invalid values are rejected.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings at {}: {err}",
                    path.display()
                );
                IngestSettings::default()
            })
        } else {
            IngestSettings::default()
        };

        data.validate()?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> IngestSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: IngestSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: IngestSettings = serde_json::from_str(&contents)?;
        data.validate()?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &IngestSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, IngestSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IngestSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
