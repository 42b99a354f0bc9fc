//! Resource usage of the current process.

use std::time::Instant;

use super::{Probe, ProcessReading};
use crate::error::ProbeError;

/// Reads CPU, memory and handle usage of this process from procfs.
///
/// The first capture has no previous tick count to compare against and reports
/// 0% CPU; sessions capture once at start so their first sample is relative to
/// the session start.
#[derive(Debug, Default)]
pub struct ProcessProbe {
    prev: Option<(u64, Instant)>,
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU percent from the tick delta since the previous call.
    fn cpu_percent(&mut self, ticks: u64, now: Instant, ticks_per_sec: f64) -> f64 {
        let Some((prev_ticks, prev_at)) = self.prev.replace((ticks, now)) else {
            return 0.0;
        };
        let elapsed = now.duration_since(prev_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        ticks.saturating_sub(prev_ticks) as f64 / ticks_per_sec / elapsed * 100.0
    }

    #[cfg(target_os = "linux")]
    fn capture_linux(&mut self) -> Result<ProcessReading, ProbeError> {
        use super::procfs;

        let stat = std::fs::read_to_string("/proc/self/stat")?;
        let ticks = procfs::parse_self_stat_ticks(&stat)?;
        let cpu_percent = self.cpu_percent(ticks, Instant::now(), procfs::clk_tck());

        let statm = std::fs::read_to_string("/proc/self/statm")?;
        let (vms_bytes, rss_bytes) = procfs::parse_statm(&statm, procfs::page_size())?;

        let mem_percent = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|raw| procfs::parse_meminfo(&raw).total)
            .filter(|&total| total > 0)
            .map(|total| rss_bytes as f64 / total as f64 * 100.0);

        let open_handles = std::fs::read_dir("/proc/self/fd")
            .ok()
            .map(|entries| entries.count() as u64);

        Ok(ProcessReading {
            cpu_percent,
            rss_bytes,
            vms_bytes,
            mem_percent,
            open_handles,
        })
    }
}

impl Probe<ProcessReading> for ProcessProbe {
    fn name(&self) -> &'static str {
        "process"
    }

    fn capture(&mut self) -> Result<ProcessReading, ProbeError> {
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
