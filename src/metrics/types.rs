use serde::{Deserialize, Serialize};

use crate::settings::MemorySettings;
use crate::telemetry::HeapUsage;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PressureLevel {
    Normal,
    Elevated,
    Critical,
}

/// Point-in-time heap pressure. Superseded by every poll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatus {
    pub used_mb: f64,
    pub total_mb: f64,
    pub usage_percentage: f64,
    pub is_low_memory: bool,
    pub is_critical_memory: bool,
}

impl MemoryStatus {
    pub fn from_usage(usage: Option<HeapUsage>, settings: &MemorySettings) -> Self {
        match usage {
            Some(usage) if usage.total_bytes > 0 => Self::from_percentage(
                usage.used_bytes as f64 / BYTES_PER_MB,
                usage.total_bytes as f64 / BYTES_PER_MB,
                settings,
            ),
            _ => Self::default(),
        }
    }

    fn from_percentage(used_mb: f64, total_mb: f64, settings: &MemorySettings) -> Self {
        let usage_percentage = used_mb / total_mb * 100.0;
        Self {
            used_mb,
            total_mb,
            usage_percentage,
            is_low_memory: usage_percentage > settings.low_threshold_percent,
            is_critical_memory: usage_percentage > settings.critical_threshold_percent,
        }
    }

    /// Status for a given usage percentage, with totals normalised to 100 MB.
    pub fn with_percentage(usage_percentage: f64, settings: &MemorySettings) -> Self {
        Self::from_percentage(usage_percentage, 100.0, settings)
    }

    pub fn level(&self) -> PressureLevel {
        if self.is_critical_memory {
            PressureLevel::Critical
        } else if self.is_low_memory {
            PressureLevel::Elevated
        } else {
            PressureLevel::Normal
        }
    }
}
