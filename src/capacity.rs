use serde::{Deserialize, Serialize};

use crate::telemetry::HostTelemetry;

const DEFAULT_CORES: usize = 4;
const DEFAULT_MEMORY_GB: f64 = 4.0;
const LOW_POWER_MAX_CORES: usize = 2;

/// One-shot capacity rating for the host running an ingestion session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapacity {
    pub is_mobile_class: bool,
    pub is_low_power_class: bool,
    pub estimated_max_safe_items: usize,
    pub recommended_batch_size: usize,
    pub logical_cores: usize,
    pub device_memory_gb: f64,
}

pub struct CapacityProfiler<'a> {
    telemetry: &'a dyn HostTelemetry,
}

impl<'a> CapacityProfiler<'a> {
    pub fn new(telemetry: &'a dyn HostTelemetry) -> Self {
        Self { telemetry }
    }

    pub fn profile(&self) -> DeviceCapacity {
        let logical_cores = self.telemetry.logical_cores().unwrap_or(DEFAULT_CORES);
        let device_memory_gb = self
            .telemetry
            .device_memory_gb()
            .unwrap_or(DEFAULT_MEMORY_GB);
        let is_mobile_class = self.telemetry.is_mobile();
        let is_low_power_class = logical_cores <= LOW_POWER_MAX_CORES;

        let (estimated_max_safe_items, recommended_batch_size) =
            match (is_mobile_class, is_low_power_class) {
                (true, _) => (30, 10),
                (false, true) => (100, 20),
                (false, false) => (200, 30),
            };

        let capacity = DeviceCapacity {
            is_mobile_class,
            is_low_power_class,
            estimated_max_safe_items,
            recommended_batch_size,
            logical_cores,
            device_memory_gb,
        };

        log::info!(
            "Device capacity: {} cores, {:.1} GB, mobile={}, low_power={}, batch={}, max_safe={}",
            logical_cores,
            device_memory_gb,
            is_mobile_class,
            is_low_power_class,
            recommended_batch_size,
            estimated_max_safe_items
        );

        capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::StaticTelemetry;

    fn profile(telemetry: StaticTelemetry) -> DeviceCapacity {
        CapacityProfiler::new(&telemetry).profile()
    }

    #[test]
    fn desktop_eight_cores() {
        let capacity = profile(StaticTelemetry::new(Some(8), Some(8.0), false));
        assert!(!capacity.is_mobile_class);
        assert!(!capacity.is_low_power_class);
        assert_eq!(capacity.estimated_max_safe_items, 200);
        assert_eq!(capacity.recommended_batch_size, 30);
    }

    #[test]
    fn mobile_wins_over_core_count() {
        let capacity = profile(StaticTelemetry::new(Some(8), Some(6.0), true));
        assert!(capacity.is_mobile_class);
        assert_eq!(capacity.estimated_max_safe_items, 30);
        assert_eq!(capacity.recommended_batch_size, 10);

        let capacity = profile(StaticTelemetry::new(Some(2), None, true));
        assert!(capacity.is_low_power_class);
        assert_eq!(capacity.recommended_batch_size, 10);
    }

    #[test]
    fn dual_core_desktop_is_low_power() {
        let capacity = profile(StaticTelemetry::new(Some(2), Some(8.0), false));
        assert!(capacity.is_low_power_class);
        assert_eq!(capacity.estimated_max_safe_items, 100);
        assert_eq!(capacity.recommended_batch_size, 20);
    }

    #[test]
    fn missing_hints_use_conservative_defaults() {
        let capacity = profile(StaticTelemetry::unavailable());
        assert_eq!(capacity.logical_cores, 4);
        assert_eq!(capacity.device_memory_gb, 4.0);
        assert!(!capacity.is_low_power_class);
        assert_eq!(capacity.recommended_batch_size, 30);
    }

    #[test]
    fn profiling_is_deterministic() {
        let telemetry = StaticTelemetry::new(Some(6), Some(16.0), false);
        let profiler = CapacityProfiler::new(&telemetry);
        assert_eq!(profiler.profile(), profiler.profile());
    }
}
