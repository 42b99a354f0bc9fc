//! Snapshot sources: point-in-time resource readings.
//!
//! Every probe implements [`Probe`] for its own reading type. A probe never
//! panics or propagates a failure into the sampling loop: it returns a
//! [`ProbeError`] for its own metric group, and the
//! [`Assembler`](crate::sample::Assembler) turns that into absent fields while
//! every other group is still recorded.
//!
//! | Probe | Reading | Source |
//! |---|---|---|
//! | [`ProcessProbe`] | [`ProcessReading`] | `/proc/self/{stat,statm,fd}` |
//! | [`SystemProbe`] | [`SystemReading`] | `/proc/stat`, `/proc/meminfo` |
//! | [`IoProbe`] | [`IoCounters`] | `/proc/diskstats`, `/proc/net/dev` |
//! | [`AllocProbe`] | [`AllocReading`] | [`TracingAllocator`] counters |
//! | [`AcceleratorProbe`] | [`AcceleratorReading`] | `nvidia-smi`, DRM sysfs |

pub mod accelerator;
pub mod alloc;
pub mod io;
pub mod procfs;
pub mod process;
pub mod system;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::MetricsConfig;
use crate::error::ProbeError;

pub use accelerator::{AcceleratorProbe, DrmSysfsBackend, NvidiaSmiBackend};
pub use alloc::{AllocProbe, TracingAllocator, traced_memory};
pub use io::IoProbe;
pub use process::ProcessProbe;
pub use system::SystemProbe;

/// A single-purpose read of one resource-usage dimension.
///
/// `capture` takes `&mut self` because rate metrics (CPU percent) are derived
/// from the previous capture of the same probe.
pub trait Probe<R>: Send {
    /// Short identifier used in log lines.
    fn name(&self) -> &'static str;

    /// Read the current value, bounded in time.
    fn capture(&mut self) -> Result<R, ProbeError>;
}

/// Resource usage of the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessReading {
    /// CPU time over wall time since the previous capture; may exceed 100 on
    /// multi-core machines.
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    pub mem_percent: Option<f64>,
    pub open_handles: Option<u64>,
}

/// Machine-wide CPU and memory usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemReading {
    pub cpu_percent: f64,
    pub ram_used_bytes: u64,
    pub ram_available_bytes: u64,
    pub ram_percent: f64,
    pub swap_used_bytes: u64,
    pub swap_percent: f64,
}

/// Cumulative since-boot counters. Each group is independently optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    pub disk: Option<DiskCounters>,
    pub net: Option<NetCounters>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetCounters {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
}

/// Heap usage seen by the counting allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocReading {
    pub current_bytes: u64,
    pub peak_bytes: u64,
}

/// First accelerator device. Any field may be missing even on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorReading {
    pub util_percent: Option<f64>,
    pub mem_used_mb: Option<f64>,
    pub mem_total_mb: Option<f64>,
    pub temp_c: Option<f64>,
    pub power_w: Option<f64>,
}

/// The full set of probes one session samples from.
pub struct ProbeSet {
    pub process: Box<dyn Probe<ProcessReading>>,
    pub system: Box<dyn Probe<SystemReading>>,
    pub io: Box<dyn Probe<IoCounters>>,
    pub alloc: Box<dyn Probe<AllocReading>>,
    pub accelerator: Box<dyn Probe<AcceleratorReading>>,
}

impl ProbeSet {
    /// Probes for the current platform.
    pub fn detect(config: &MetricsConfig) -> Self {
        Self {
            process: Box::new(ProcessProbe::new()),
            system: Box::new(SystemProbe::new()),
            io: Box::new(IoProbe),
            alloc: Box::new(AllocProbe),
            accelerator: Box::new(AcceleratorProbe::detect(config)),
        }
    }
}

/// Builds a fresh [`ProbeSet`] for each new session.
pub type ProbeFactory = Arc<dyn Fn(&MetricsConfig) -> ProbeSet + Send + Sync>;

/// Factory that returns [`ProbeSet::detect`].
pub fn platform_probes() -> ProbeFactory {
    Arc::new(ProbeSet::detect)
}

/// Capture and log a failure at debug level, returning `None` in its place.
pub(crate) fn capture_or_absent<R>(probe: &mut dyn Probe<R>) -> Option<R> {
    match probe.capture() {
        Ok(reading) => Some(reading),
        Err(e) => {
            log::debug!("probe {} unavailable: {e}", probe.name());
            None
        }
    }
}
