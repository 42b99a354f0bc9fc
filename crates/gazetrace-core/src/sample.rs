//! The telemetry record and the assembler that builds it.
//!
//! A [`Sample`] has one fixed schema. Fields a probe could not supply are
//! `None`, written as an empty CSV cell and as `null` in JSON, never dropped.

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::probe::{IoCounters, ProbeSet, capture_or_absent};

const MIB: f64 = 1024.0 * 1024.0;

/// Column names of the record stream, in order.
pub const CSV_COLUMNS: [&str; 25] = [
    "ts",
    "uptime_s",
    "proc_cpu_percent",
    "proc_mem_rss_mb",
    "proc_mem_vms_mb",
    "proc_mem_pct",
    "open_fds",
    "sys_cpu_percent",
    "sys_ram_used_mb",
    "sys_ram_available_mb",
    "sys_ram_percent",
    "sys_swap_used_mb",
    "sys_swap_percent",
    "disk_read_mb",
    "disk_write_mb",
    "net_bytes_sent_mb",
    "net_bytes_recv_mb",
    "traced_mem_current_mb",
    "traced_mem_peak_mb",
    "gpu_util_percent",
    "gpu_mem_used_mb",
    "gpu_mem_total_mb",
    "gpu_temp_c",
    "gpu_power_w",
    "last_request_ms",
];

/// Header line of the record stream (no trailing newline).
pub fn csv_header() -> String {
    CSV_COLUMNS.join(",")
}

/// One assembled telemetry record. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock capture time, seconds since the Unix epoch.
    pub ts: f64,
    /// Monotonic time since the session started.
    pub uptime_s: f64,

    pub proc_cpu_percent: Option<f64>,
    pub proc_mem_rss_mb: Option<f64>,
    pub proc_mem_vms_mb: Option<f64>,
    pub proc_mem_pct: Option<f64>,
    pub open_fds: Option<u64>,

    pub sys_cpu_percent: Option<f64>,
    pub sys_ram_used_mb: Option<f64>,
    pub sys_ram_available_mb: Option<f64>,
    pub sys_ram_percent: Option<f64>,
    pub sys_swap_used_mb: Option<f64>,
    pub sys_swap_percent: Option<f64>,

    /// Session-relative I/O, in MiB.
    pub disk_read_mb: Option<f64>,
    pub disk_write_mb: Option<f64>,
    pub net_bytes_sent_mb: Option<f64>,
    pub net_bytes_recv_mb: Option<f64>,

    pub traced_mem_current_mb: Option<f64>,
    pub traced_mem_peak_mb: Option<f64>,

    pub gpu_util_percent: Option<f64>,
    pub gpu_mem_used_mb: Option<f64>,
    pub gpu_mem_total_mb: Option<f64>,
    pub gpu_temp_c: Option<f64>,
    pub gpu_power_w: Option<f64>,

    /// Most recent externally reported latency, carried forward.
    pub last_request_ms: Option<f64>,
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.4}"),
        _ => String::new(),
    }
}

impl Sample {
    /// CSV row matching [`CSV_COLUMNS`] (no trailing newline).
    pub fn to_csv_row(&self) -> String {
        let cells = [
            format!("{:.3}", self.ts),
            format!("{:.4}", self.uptime_s),
            cell(self.proc_cpu_percent),
            cell(self.proc_mem_rss_mb),
            cell(self.proc_mem_vms_mb),
            cell(self.proc_mem_pct),
            self.open_fds.map(|n| n.to_string()).unwrap_or_default(),
            cell(self.sys_cpu_percent),
            cell(self.sys_ram_used_mb),
            cell(self.sys_ram_available_mb),
            cell(self.sys_ram_percent),
            cell(self.sys_swap_used_mb),
            cell(self.sys_swap_percent),
            cell(self.disk_read_mb),
            cell(self.disk_write_mb),
            cell(self.net_bytes_sent_mb),
            cell(self.net_bytes_recv_mb),
            cell(self.traced_mem_current_mb),
            cell(self.traced_mem_peak_mb),
            cell(self.gpu_util_percent),
            cell(self.gpu_mem_used_mb),
            cell(self.gpu_mem_total_mb),
            cell(self.gpu_temp_c),
            cell(self.gpu_power_w),
            cell(self.last_request_ms),
        ];
        cells.join(",")
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

fn unix_secs_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Builds [`Sample`]s for one session.
///
/// Holds the session start mark and the I/O baseline, both taken by
/// [`Assembler::start`], and the receiving end of the latency queue.
pub struct Assembler {
    probes: ProbeSet,
    started: Instant,
    baseline: IoCounters,
    latency_rx: Receiver<f64>,
    last_latency: Option<f64>,
}

impl Assembler {
    /// Take the start mark and I/O baseline now and prime rate probes so the
    /// first sample's CPU figures cover the time since start.
    pub fn start(mut probes: ProbeSet, latency_rx: Receiver<f64>) -> Self {
        let baseline = capture_or_absent(probes.io.as_mut()).unwrap_or_default();
        let _ = probes.process.capture();
        let _ = probes.system.capture();
        Self {
            probes,
            started: Instant::now(),
            baseline,
            latency_rx,
            last_latency: None,
        }
    }

    /// Time since [`Assembler::start`].
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Keep the newest queued observation; keep the previous one if none arrived.
    fn drain_latency(&mut self) -> Option<f64> {
        while let Ok(v) = self.latency_rx.try_recv() {
            self.last_latency = Some(v);
        }
        self.last_latency
    }

    /// Capture every probe and build one record.
    pub fn assemble(&mut self) -> Sample {
        let ts = unix_secs_now();
        let uptime_s = self.started.elapsed().as_secs_f64();

        let process = capture_or_absent(self.probes.process.as_mut());
        let system = capture_or_absent(self.probes.system.as_mut());
        let io = capture_or_absent(self.probes.io.as_mut())
            .map(|now| now.since(&self.baseline))
            .unwrap_or_default();
        let alloc = capture_or_absent(self.probes.alloc.as_mut());
        let gpu = capture_or_absent(self.probes.accelerator.as_mut()).unwrap_or_default();
        let last_request_ms = self.drain_latency();

        Sample {
            ts,
            uptime_s,
            proc_cpu_percent: process.map(|p| p.cpu_percent),
            proc_mem_rss_mb: process.map(|p| mib(p.rss_bytes)),
            proc_mem_vms_mb: process.map(|p| mib(p.vms_bytes)),
            proc_mem_pct: process.and_then(|p| p.mem_percent),
            open_fds: process.and_then(|p| p.open_handles),
            sys_cpu_percent: system.map(|s| s.cpu_percent),
            sys_ram_used_mb: system.map(|s| mib(s.ram_used_bytes)),
            sys_ram_available_mb: system.map(|s| mib(s.ram_available_bytes)),
            sys_ram_percent: system.map(|s| s.ram_percent),
            sys_swap_used_mb: system.map(|s| mib(s.swap_used_bytes)),
            sys_swap_percent: system.map(|s| s.swap_percent),
            disk_read_mb: io.disk.map(|d| mib(d.read_bytes)),
            disk_write_mb: io.disk.map(|d| mib(d.write_bytes)),
            net_bytes_sent_mb: io.net.map(|n| mib(n.sent_bytes)),
            net_bytes_recv_mb: io.net.map(|n| mib(n.recv_bytes)),
            traced_mem_current_mb: alloc.map(|a| mib(a.current_bytes)),
            traced_mem_peak_mb: alloc.map(|a| mib(a.peak_bytes)),
            gpu_util_percent: gpu.util_percent,
            gpu_mem_used_mb: gpu.mem_used_mb,
            gpu_mem_total_mb: gpu.mem_total_mb,
            gpu_temp_c: gpu.temp_c,
            gpu_power_w: gpu.power_w,
            last_request_ms,
        }
    }
}
