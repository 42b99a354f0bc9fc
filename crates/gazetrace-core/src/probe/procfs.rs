//! Parsers for the procfs files the probes read.
//!
//! Parsing is kept separate from file access so every parser can be exercised
//! against fixture text on any platform; only the readers in the probe modules
//! are gated on `target_os = "linux"`.

use crate::error::ProbeError;

/// Sector size used by `/proc/diskstats`, independent of the device.
pub const DISKSTATS_SECTOR_BYTES: u64 = 512;

/// Fields of `/proc/meminfo` the probes use, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total: Option<u64>,
    pub available: Option<u64>,
    pub free: Option<u64>,
    pub swap_total: Option<u64>,
    pub swap_free: Option<u64>,
}

/// Aggregate CPU tick counters from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

/// Ticks per second for `/proc` CPU counters.
#[cfg(target_os = "linux")]
pub fn clk_tck() -> f64 {
    // SAFETY: `sysconf` is thread-safe for this query and has no side effects.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 { hz as f64 } else { 100.0 }
}

/// Page size for `/proc/self/statm`.
#[cfg(target_os = "linux")]
pub fn page_size() -> u64 {
    // SAFETY: `sysconf` is thread-safe for this query and has no side effects.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

pub fn parse_meminfo(raw: &str) -> MemInfo {
    let mut info = MemInfo::default();
    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        let bytes = Some(kib * 1024);
        match key {
            "MemTotal" => info.total = bytes,
            "MemAvailable" => info.available = bytes,
            "MemFree" => info.free = bytes,
            "SwapTotal" => info.swap_total = bytes,
            "SwapFree" => info.swap_free = bytes,
            _ => {}
        }
    }
    info
}

pub fn parse_proc_stat_cpu(raw: &str) -> Result<CpuTimes, ProbeError> {
    let line = raw
        .lines()
        .find_map(|l| l.strip_prefix("cpu "))
        .ok_or_else(|| ProbeError::parse("/proc/stat", "no aggregate cpu line"))?;
    let parts: Vec<u64> = line
        .split_whitespace()
        .filter_map(|s| s.parse::<u64>().ok())
        .collect();
    if parts.len() < 4 {
        return Err(ProbeError::parse("/proc/stat", "short cpu line"));
    }
    // user nice system idle iowait irq softirq steal; guest time is already
    // folded into user/nice.
    let field = |i: usize| parts.get(i).copied().unwrap_or(0);
    let idle = field(3) + field(4);
    let busy = field(0) + field(1) + field(2) + field(5) + field(6) + field(7);
    Ok(CpuTimes {
        busy,
        total: busy + idle,
    })
}

/// utime + stime in clock ticks from `/proc/<pid>/stat`.
pub fn parse_self_stat_ticks(raw: &str) -> Result<u64, ProbeError> {
    // The command name may contain spaces and parentheses; fields resume
    // after the last ')'.
    let rest = raw
        .rfind(')')
        .map(|i| &raw[i + 1..])
        .ok_or_else(|| ProbeError::parse("/proc/self/stat", "missing comm field"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // `rest` starts at field 3 (state); utime and stime are fields 14 and 15.
    let utime = fields.get(11).and_then(|v| v.parse::<u64>().ok());
    let stime = fields.get(12).and_then(|v| v.parse::<u64>().ok());
    match (utime, stime) {
        (Some(u), Some(s)) => Ok(u + s),
        _ => Err(ProbeError::parse("/proc/self/stat", "missing utime/stime")),
    }
}

/// (virtual, resident) bytes from `/proc/<pid>/statm`.
pub fn parse_statm(raw: &str, page_size: u64) -> Result<(u64, u64), ProbeError> {
    let mut parts = raw.split_whitespace().map(|v| v.parse::<u64>().ok());
    match (parts.next().flatten(), parts.next().flatten()) {
        (Some(size), Some(resident)) => Ok((size * page_size, resident * page_size)),
        _ => Err(ProbeError::parse("/proc/self/statm", "expected size and resident pages")),
    }
}

pub fn is_likely_disk_device(name: &str) -> bool {
    if name.starts_with("loop")
        || name.starts_with("ram")
        || name.starts_with("dm-")
        || name.starts_with("md")
        || name.starts_with("zram")
        || name.starts_with("sr")
        || name.starts_with("fd")
        || name.starts_with("nbd")
    {
        return false;
    }
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return !name.contains('p');
    }
    !name.chars().last().is_some_and(|c| c.is_ascii_digit())
}

/// (read, written) bytes summed over whole-disk devices in `/proc/diskstats`.
pub fn parse_diskstats(raw: &str) -> Result<(u64, u64), ProbeError> {
    let mut disks = 0usize;
    let mut read_sectors = 0u64;
    let mut write_sectors = 0u64;

    for line in raw.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 || !is_likely_disk_device(parts[2]) {
            continue;
        }
        let (Ok(read), Ok(written)) = (parts[5].parse::<u64>(), parts[9].parse::<u64>()) else {
            continue;
        };
        disks += 1;
        read_sectors += read;
        write_sectors += written;
    }

    if disks == 0 {
        return Err(ProbeError::parse("/proc/diskstats", "no disk devices"));
    }
    Ok((
        read_sectors * DISKSTATS_SECTOR_BYTES,
        write_sectors * DISKSTATS_SECTOR_BYTES,
    ))
}

/// (sent, received) bytes summed over every interface in `/proc/net/dev`.
pub fn parse_net_dev(raw: &str) -> Result<(u64, u64), ProbeError> {
    let mut ifaces = 0usize;
    let mut rx = 0u64;
    let mut tx = 0u64;

    for line in raw.lines().skip(2) {
        let Some((_, stats)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = stats
            .split_whitespace()
            .filter_map(|s| s.parse::<u64>().ok())
            .collect();
        if fields.len() < 16 {
            continue;
        }
        ifaces += 1;
        rx += fields[0];
        tx += fields[8];
    }

    if ifaces == 0 {
        return Err(ProbeError::parse("/proc/net/dev", "no interfaces"));
    }
    Ok((tx, rx))
}
