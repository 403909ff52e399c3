//! Samples host and process resource usage.
//!
//! Refreshes only the CPU and memory subsystems (not `System::new_all()`)
//! since a full refresh walks every process on the host and this is
//! called on a timer.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Memory percent at which the optimizer starts warning / treats as
/// critical. Matches spec.md §4.6.
pub const MEM_WARN_PERCENT: f32 = 80.0;
pub const MEM_CRITICAL_PERCENT: f32 = 90.0;
pub const CPU_WARN_PERCENT: f32 = 85.0;
pub const CPU_CRITICAL_PERCENT: f32 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceStats {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub process_rss_bytes: u64,
    pub system_total_bytes: u64,
}

impl ResourceStats {
    pub fn is_mem_warn(&self) -> bool {
        self.ram_percent >= MEM_WARN_PERCENT
    }

    pub fn is_mem_critical(&self) -> bool {
        self.ram_percent >= MEM_CRITICAL_PERCENT
    }

    pub fn is_cpu_warn(&self) -> bool {
        self.cpu_percent >= CPU_WARN_PERCENT
    }

    pub fn is_cpu_critical(&self) -> bool {
        self.cpu_percent >= CPU_CRITICAL_PERCENT
    }
}

pub struct ResourceMonitor {
    sys: Mutex<System>,
    pid: Pid,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Self {
            sys: Mutex::new(sys),
            pid,
        }
    }

    /// Re-sample CPU and memory and return the current snapshot.
    pub fn sample(&self) -> ResourceStats {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let total = sys.total_memory();
        let used = sys.used_memory();
        let ram_percent = if total > 0 {
            (used as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };
        let cpu_percent = sys.global_cpu_usage();
        let process_rss_bytes = sys.process(self.pid).map(|p| p.memory()).unwrap_or(0);

        ResourceStats {
            cpu_percent,
            ram_percent,
            process_rss_bytes,
            system_total_bytes: total,
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_produces_plausible_percentages() {
        let monitor = ResourceMonitor::new();
        let stats = monitor.sample();
        assert!(stats.ram_percent >= 0.0 && stats.ram_percent <= 100.0);
        assert!(stats.cpu_percent >= 0.0);
    }

    #[test]
    fn threshold_helpers_follow_constants() {
        let warn = ResourceStats {
            cpu_percent: 0.0,
            ram_percent: MEM_WARN_PERCENT,
            process_rss_bytes: 0,
            system_total_bytes: 0,
        };
        assert!(warn.is_mem_warn());
        assert!(!warn.is_mem_critical());
    }
}
