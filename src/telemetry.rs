//! Read-only host signals: heap usage plus core and memory hints.
//!
//! Every reading is optional. Callers treat `None` as "unknown" and fall back
//! to conservative defaults instead of failing.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

pub trait HostTelemetry: Send + Sync {
    fn logical_cores(&self) -> Option<usize>;

    /// Device memory hint in gigabytes.
    fn device_memory_gb(&self) -> Option<f64>;

    fn is_mobile(&self) -> bool;

    fn heap_usage(&self) -> Option<HeapUsage>;
}

/// Live host readings backed by `sysinfo`.
pub struct SystemTelemetry {
    system: Mutex<System>,
}

impl SystemTelemetry {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTelemetry for SystemTelemetry {
    fn logical_cores(&self) -> Option<usize> {
        std::thread::available_parallelism().ok().map(|n| n.get())
    }

    fn device_memory_gb(&self) -> Option<f64> {
        let total = self.system().total_memory();
        if total == 0 {
            return None;
        }
        Some(total as f64 / 1024.0 / 1024.0 / 1024.0)
    }

    fn is_mobile(&self) -> bool {
        cfg!(any(target_os = "android", target_os = "ios"))
    }

    fn heap_usage(&self) -> Option<HeapUsage> {
        let mut system = self.system();
        system.refresh_memory();

        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return None;
        }

        Some(HeapUsage {
            used_bytes: system.used_memory(),
            total_bytes,
        })
    }
}

/// Fixed host snapshot. Heap readings can be scripted: each call pops the next
/// scripted reading and the last one repeats forever.
pub struct StaticTelemetry {
    pub cores: Option<usize>,
    pub memory_gb: Option<f64>,
    pub mobile: bool,
    heap: Mutex<VecDeque<Option<HeapUsage>>>,
}

impl StaticTelemetry {
    pub fn new(cores: Option<usize>, memory_gb: Option<f64>, mobile: bool) -> Self {
        Self {
            cores,
            memory_gb,
            mobile,
            heap: Mutex::new(VecDeque::new()),
        }
    }

    /// Host that exposes no telemetry at all.
    pub fn unavailable() -> Self {
        Self::new(None, None, false)
    }

    pub fn with_heap_usage(self, readings: impl IntoIterator<Item = Option<HeapUsage>>) -> Self {
        {
            let mut heap = self.heap.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            heap.extend(readings);
        }
        self
    }

    /// Convenience for scripting readings as usage percentages of a 1 GiB heap.
    pub fn with_usage_percentages(self, percentages: impl IntoIterator<Item = f64>) -> Self {
        const TOTAL: u64 = 1024 * 1024 * 1024;
        self.with_heap_usage(percentages.into_iter().map(|pct| {
            Some(HeapUsage {
                used_bytes: (TOTAL as f64 * pct / 100.0) as u64,
                total_bytes: TOTAL,
            })
        }))
    }
}

impl HostTelemetry for StaticTelemetry {
    fn logical_cores(&self) -> Option<usize> {
        self.cores
    }

    fn device_memory_gb(&self) -> Option<f64> {
        self.memory_gb
    }

    fn is_mobile(&self) -> bool {
        self.mobile
    }

    fn heap_usage(&self) -> Option<HeapUsage> {
        let mut heap = self.heap.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if heap.len() > 1 {
            heap.pop_front().flatten()
        } else {
            heap.front().copied().flatten()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_readings_repeat_the_last_value() {
        let telemetry = StaticTelemetry::unavailable().with_usage_percentages([50.0, 92.0]);
        let first = telemetry.heap_usage().unwrap();
        assert_eq!(first.used_bytes * 2, first.total_bytes);

        let second = telemetry.heap_usage().unwrap();
        let third = telemetry.heap_usage().unwrap();
        assert_eq!(second, third);
        assert!(second.used_bytes > first.used_bytes);
    }

    #[test]
    fn unavailable_host_reports_nothing() {
        let telemetry = StaticTelemetry::unavailable();
        assert_eq!(telemetry.heap_usage(), None);
        assert_eq!(telemetry.logical_cores(), None);
        assert_eq!(telemetry.device_memory_gb(), None);
    }

    #[test]
    fn system_telemetry_reports_a_consistent_heap() {
        let telemetry = SystemTelemetry::new();
        if let Some(usage) = telemetry.heap_usage() {
            assert!(usage.used_bytes <= usage.total_bytes);
        }
        assert!(telemetry.logical_cores().unwrap_or(1) >= 1);
    }
}
