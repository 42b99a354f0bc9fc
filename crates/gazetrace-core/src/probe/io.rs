//! Cumulative disk and network counters.
//!
//! The raw counters count from boot; the assembler subtracts the values
//! captured at session start.

use super::{DiskCounters, IoCounters, NetCounters, Probe};
use crate::error::ProbeError;

#[derive(Debug, Default, Clone, Copy)]
pub struct IoProbe;

impl IoProbe {
    #[cfg(target_os = "linux")]
    fn read_disk() -> Result<DiskCounters, ProbeError> {
        let raw = std::fs::read_to_string("/proc/diskstats")?;
        let (read_bytes, write_bytes) = super::procfs::parse_diskstats(&raw)?;
        Ok(DiskCounters {
            read_bytes,
            write_bytes,
        })
    }

    #[cfg(target_os = "linux")]
    fn read_net() -> Result<NetCounters, ProbeError> {
        let raw = std::fs::read_to_string("/proc/net/dev")?;
        let (sent_bytes, recv_bytes) = super::procfs::parse_net_dev(&raw)?;
        Ok(NetCounters {
            sent_bytes,
            recv_bytes,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn read_disk() -> Result<DiskCounters, ProbeError> {
        Err(ProbeError::Unsupported)
    }

    #[cfg(not(target_os = "linux"))]
    fn read_net() -> Result<NetCounters, ProbeError> {
        Err(ProbeError::Unsupported)
    }
}

/// Keep whichever group succeeded; fail only when both did.
fn combine(
    disk: Result<DiskCounters, ProbeError>,
    net: Result<NetCounters, ProbeError>,
) -> Result<IoCounters, ProbeError> {
    match (disk, net) {
        (Err(e), Err(_)) => Err(e),
        (disk, net) => {
            if let Err(e) = &disk {
                log::debug!("disk counters unavailable: {e}");
            }
            if let Err(e) = &net {
                log::debug!("network counters unavailable: {e}");
            }
            Ok(IoCounters {
                disk: disk.ok(),
                net: net.ok(),
            })
        }
    }
}

impl IoCounters {
    /// Counters accumulated since `baseline`.
    ///
    /// A group missing on either side stays missing. A counter that went
    /// backwards (device removed, counter wrapped) reads as zero.
    pub fn since(&self, baseline: &IoCounters) -> IoCounters {
        let disk = match (self.disk, baseline.disk) {
            (Some(now), Some(base)) => Some(DiskCounters {
                read_bytes: now.read_bytes.saturating_sub(base.read_bytes),
                write_bytes: now.write_bytes.saturating_sub(base.write_bytes),
            }),
            _ => None,
        };
        let net = match (self.net, baseline.net) {
            (Some(now), Some(base)) => Some(NetCounters {
                sent_bytes: now.sent_bytes.saturating_sub(base.sent_bytes),
                recv_bytes: now.recv_bytes.saturating_sub(base.recv_bytes),
            }),
            _ => None,
        };
        IoCounters { disk, net }
    }
}

impl Probe<IoCounters> for IoProbe {
    fn name(&self) -> &'static str {
        "io"
    }

    fn capture(&mut self) -> Result<IoCounters, ProbeError> {
        combine(Self::read_disk(), Self::read_net())
    }
}
