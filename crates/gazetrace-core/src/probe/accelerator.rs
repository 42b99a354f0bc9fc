//! Single-device accelerator readings.
//!
//! [`AcceleratorProbe`] walks its backends in a fixed order and returns the
//! first reading that succeeds:
//!
//! 1. [`NvidiaSmiBackend`]: `nvidia-smi --query-gpu` for device 0.
//! 2. [`DrmSysfsBackend`]: `/sys/class/drm/card*/device` (amdgpu and
//!    similar drivers exposing `gpu_busy_percent`).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::{AcceleratorReading, Probe};
use crate::config::MetricsConfig;
use crate::error::ProbeError;

const NVIDIA_SMI: &str = "nvidia-smi";
const NVIDIA_QUERY: &str =
    "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu,power.draw";

/// Tries each backend in order; first success wins.
pub struct AcceleratorProbe {
    backends: Vec<Box<dyn Probe<AcceleratorReading>>>,
}

impl AcceleratorProbe {
    /// The platform backend chain, or an empty chain when disabled.
    pub fn detect(config: &MetricsConfig) -> Self {
        if !config.accelerator {
            return Self::with_backends(Vec::new());
        }
        Self::with_backends(vec![
            Box::new(NvidiaSmiBackend::new(config.command_timeout)),
            Box::new(DrmSysfsBackend::default()),
        ])
    }

    pub fn with_backends(backends: Vec<Box<dyn Probe<AcceleratorReading>>>) -> Self {
        Self { backends }
    }
}

impl Probe<AcceleratorReading> for AcceleratorProbe {
    fn name(&self) -> &'static str {
        "accelerator"
    }

    fn capture(&mut self) -> Result<AcceleratorReading, ProbeError> {
        for backend in &mut self.backends {
            match backend.capture() {
                Ok(reading) => return Ok(reading),
                Err(e) => log::debug!("accelerator backend {} failed: {e}", backend.name()),
            }
        }
        Err(ProbeError::NoBackend)
    }
}

// ---------------------------------------------------------------------------
// nvidia-smi
// ---------------------------------------------------------------------------

/// Queries the first NVIDIA device through `nvidia-smi`.
///
/// Once the binary is found to be missing the backend stops spawning it.
pub struct NvidiaSmiBackend {
    timeout: Duration,
    missing: bool,
}

impl NvidiaSmiBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            missing: false,
        }
    }
}

impl Probe<AcceleratorReading> for NvidiaSmiBackend {
    fn name(&self) -> &'static str {
        NVIDIA_SMI
    }

    fn capture(&mut self) -> Result<AcceleratorReading, ProbeError> {
        if self.missing {
            return Err(ProbeError::Unsupported);
        }
        let args = [NVIDIA_QUERY, "--format=csv,noheader,nounits", "-i", "0"];
        match run_command(NVIDIA_SMI, &args, self.timeout) {
            Ok(out) => parse_nvidia_smi(&out),
            Err(ProbeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.missing = true;
                Err(ProbeError::Unsupported)
            }
            Err(e) => Err(e),
        }
    }
}

/// Run a command with a hard deadline and return its trimmed stdout.
fn run_command(program: &'static str, args: &[&str], timeout: Duration) -> Result<String, ProbeError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let start = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => {
                if !status.success() {
                    return Err(ProbeError::command(program, format!("exited with {status}")));
                }
                let mut out = Vec::new();
                if let Some(mut stdout) = child.stdout.take() {
                    stdout.read_to_end(&mut out)?;
                }
                return Ok(String::from_utf8_lossy(&out).trim().to_string());
            }
            None => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProbeError::command(program, "timed out"));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

/// `nvidia-smi` writes `[N/A]` or `[Not Supported]` for fields a board lacks.
fn parse_optional_f64(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_nvidia_smi(out: &str) -> Result<AcceleratorReading, ProbeError> {
    let line = out
        .lines()
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| ProbeError::parse("nvidia-smi output", "empty"))?;
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 5 {
        return Err(ProbeError::parse("nvidia-smi output", line.to_string()));
    }
    Ok(AcceleratorReading {
        util_percent: parse_optional_f64(fields[0]),
        mem_used_mb: parse_optional_f64(fields[1]),
        mem_total_mb: parse_optional_f64(fields[2]),
        temp_c: parse_optional_f64(fields[3]),
        power_w: parse_optional_f64(fields[4]),
    })
}

// ---------------------------------------------------------------------------
// DRM sysfs
// ---------------------------------------------------------------------------

/// Reads the first DRM card exposing `gpu_busy_percent`.
pub struct DrmSysfsBackend {
    root: PathBuf,
}

impl Default for DrmSysfsBackend {
    fn default() -> Self {
        Self::with_root("/sys/class/drm")
    }
}

impl DrmSysfsBackend {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn device_dirs(&self) -> Result<Vec<PathBuf>, ProbeError> {
        let mut cards: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .flatten()
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                // card0, card1 … but not connectors such as card0-DP-1.
                name.strip_prefix("card")
                    .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            })
            .map(|e| e.path().join("device"))
            .collect();
        cards.sort();
        Ok(cards)
    }
}

fn read_sysfs_f64(path: &Path) -> Option<f64> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
}

/// First hwmon directory under a DRM device.
fn hwmon_dir(device: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(device.join("hwmon"))
        .ok()?
        .flatten()
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

fn read_drm_device(device: &Path) -> Result<AcceleratorReading, ProbeError> {
    let busy = device.join("gpu_busy_percent");
    let util_percent = read_sysfs_f64(&busy)
        .ok_or_else(|| ProbeError::parse("gpu_busy_percent", busy.display().to_string()))?;

    const MIB: f64 = 1024.0 * 1024.0;
    let mem_used_mb = read_sysfs_f64(&device.join("mem_info_vram_used")).map(|b| b / MIB);
    let mem_total_mb = read_sysfs_f64(&device.join("mem_info_vram_total")).map(|b| b / MIB);

    let hwmon = hwmon_dir(device);
    let temp_c = hwmon
        .as_deref()
        .and_then(|h| read_sysfs_f64(&h.join("temp1_input")))
        .map(|milli| milli / 1000.0);
    let power_w = hwmon.as_deref().and_then(|h| {
        read_sysfs_f64(&h.join("power1_average"))
            .or_else(|| read_sysfs_f64(&h.join("power1_input")))
            .map(|micro| micro / 1_000_000.0)
    });

    Ok(AcceleratorReading {
        util_percent: Some(util_percent),
        mem_used_mb,
        mem_total_mb,
        temp_c,
        power_w,
    })
}

impl Probe<AcceleratorReading> for DrmSysfsBackend {
    fn name(&self) -> &'static str {
        "drm_sysfs"
    }

    fn capture(&mut self) -> Result<AcceleratorReading, ProbeError> {
        self.device_dirs()?
            .iter()
            .find_map(|dir| read_drm_device(dir).ok())
            .ok_or(ProbeError::Unsupported)
    }
}
