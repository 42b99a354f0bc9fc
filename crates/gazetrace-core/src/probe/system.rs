//! Machine-wide CPU, RAM and swap usage.

use super::procfs::{CpuTimes, MemInfo};
use super::{Probe, SystemReading};
use crate::error::ProbeError;

#[derive(Debug, Default)]
pub struct SystemProbe {
    prev: Option<CpuTimes>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn cpu_percent(&mut self, now: CpuTimes) -> f64 {
        let Some(prev) = self.prev.replace(now) else {
            return 0.0;
        };
        let total = now.total.saturating_sub(prev.total);
        if total == 0 {
            return 0.0;
        }
        now.busy.saturating_sub(prev.busy) as f64 / total as f64 * 100.0
    }

    #[cfg(target_os = "linux")]
    fn capture_linux(&mut self) -> Result<SystemReading, ProbeError> {
        use super::procfs;

        let stat = std::fs::read_to_string("/proc/stat")?;
        let cpu_percent = self.cpu_percent(procfs::parse_proc_stat_cpu(&stat)?);
        let meminfo = std::fs::read_to_string("/proc/meminfo")?;
        memory_reading(cpu_percent, &procfs::parse_meminfo(&meminfo))
    }
}

/// Combine a CPU figure with parsed meminfo.
fn memory_reading(cpu_percent: f64, mem: &MemInfo) -> Result<SystemReading, ProbeError> {
    let total = mem
        .total
        .filter(|&t| t > 0)
        .ok_or_else(|| ProbeError::parse("/proc/meminfo", "missing MemTotal"))?;
    // Kernels before 3.14 lack MemAvailable.
    let available = mem
        .available
        .or(mem.free)
        .ok_or_else(|| ProbeError::parse("/proc/meminfo", "missing MemAvailable"))?
        .min(total);
    let used = total - available;

    let swap_total = mem.swap_total.unwrap_or(0);
    let swap_used = swap_total.saturating_sub(mem.swap_free.unwrap_or(swap_total));
    let swap_percent = if swap_total > 0 {
        swap_used as f64 / swap_total as f64 * 100.0
    } else {
        0.0
    };

    Ok(SystemReading {
        cpu_percent,
        ram_used_bytes: used,
        ram_available_bytes: available,
        ram_percent: used as f64 / total as f64 * 100.0,
        swap_used_bytes: swap_used,
        swap_percent,
    })
}

impl Probe<SystemReading> for SystemProbe {
    fn name(&self) -> &'static str {
        "system"
    }

    fn capture(&mut self) -> Result<SystemReading, ProbeError> {
        #[cfg(target_os = "linux")]
        {
            self.capture_linux()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(ProbeError::Unsupported)
        }
    }
}
