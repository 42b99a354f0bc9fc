//! Integration tests for gazetrace-core.
//!
//! These drive the public lifecycle end to end:
//! manager → session loop → record stream on disk → summary JSON.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use gazetrace_core::probe::{AllocProbe, DiskCounters, NetCounters};
use gazetrace_core::{
    AcceleratorReading, CSV_COLUMNS, IoCounters, Manager, MetricsConfig, Probe, ProbeError,
    ProbeSet, ProcessReading, SessionKey, Summary, SystemReading, TracingAllocator,
    summarize_file,
};

#[global_allocator]
static ALLOC: TracingAllocator = TracingAllocator::system();

// ---------------------------------------------------------------------------
// Deterministic probes
// ---------------------------------------------------------------------------

struct Fixed<R>(R);

impl<R: Copy + Send> Probe<R> for Fixed<R> {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn capture(&mut self) -> Result<R, ProbeError> {
        Ok(self.0)
    }
}

/// Counters that grow by one MiB per capture.
struct Growing(u64);

impl Probe<IoCounters> for Growing {
    fn name(&self) -> &'static str {
        "growing"
    }

    fn capture(&mut self) -> Result<IoCounters, ProbeError> {
        self.0 += 1024 * 1024;
        Ok(IoCounters {
            disk: Some(DiskCounters {
                read_bytes: self.0,
                write_bytes: self.0,
            }),
            net: Some(NetCounters {
                sent_bytes: self.0,
                recv_bytes: self.0,
            }),
        })
    }
}

struct Missing;

impl<R> Probe<R> for Missing {
    fn name(&self) -> &'static str {
        "missing"
    }

    fn capture(&mut self) -> Result<R, ProbeError> {
        Err(ProbeError::Unsupported)
    }
}

fn mock_set() -> ProbeSet {
    ProbeSet {
        process: Box::new(Fixed(ProcessReading {
            cpu_percent: 5.0,
            rss_bytes: 100 * 1024 * 1024,
            vms_bytes: 400 * 1024 * 1024,
            mem_percent: Some(1.0),
            open_handles: Some(12),
        })),
        system: Box::new(Fixed(SystemReading {
            cpu_percent: 20.0,
            ram_used_bytes: 1024 * 1024 * 1024,
            ram_available_bytes: 3 * 1024 * 1024 * 1024,
            ram_percent: 25.0,
            swap_used_bytes: 0,
            swap_percent: 0.0,
        })),
        io: Box::new(Growing(5_000_000_000)),
        alloc: Box::new(AllocProbe),
        accelerator: Box::new(Missing),
    }
}

fn config(dir: &Path, interval_ms: u64) -> MetricsConfig {
    MetricsConfig::new(dir)
        .with_interval(Duration::from_millis(interval_ms))
        .with_accelerator(false)
}

fn mock_manager(dir: &Path, interval_ms: u64) -> Manager {
    Manager::with_probe_factory(
        config(dir, interval_ms),
        Arc::new(|_: &MetricsConfig| mock_set()),
    )
}

/// Data rows of a record stream, split into cells.
fn rows(path: &Path) -> Vec<Vec<String>> {
    let text = fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
    lines
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

fn column(name: &str) -> usize {
    CSV_COLUMNS.iter().position(|c| *c == name).unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn end_to_end_session_records_and_summarizes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 50);
    let key = SessionKey::new("p1", 1);

    let session = manager.ensure_active(key.clone());
    thread::sleep(Duration::from_millis(130));
    manager.note_latency(key.clone(), 42.0);
    assert!(manager.stop(key.clone()));

    let data = rows(session.record_path());
    assert!(data.len() >= 2, "expected at least 2 rows, got {}", data.len());

    let summary_path = key.summary_path(dir.path());
    assert!(summary_path.exists());
    let summary = Summary::load(&summary_path).unwrap();
    assert!(summary.samples >= 2);
    assert_eq!(summary.samples, data.len() as u64);
    assert_eq!(summary.participant, "p1");
    assert_eq!(summary.test, 1);
    assert_eq!(summary.metric("last_request_ms").unwrap().max, 42.0);
    assert!(summary.duration_s > 0.0);
}

#[test]
fn repeated_activation_returns_same_session() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let a = manager.ensure_active(("p1", 1));
    let b = manager.ensure_active(("p1", 1));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.len(), 1);
}

#[test]
fn stop_is_true_then_false() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    manager.ensure_active(("p1", 1));
    assert!(manager.stop(("p1", 1)));
    assert!(!manager.stop(("p1", 1)));
}

#[test]
fn stop_unknown_key_has_no_side_effect() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    manager.ensure_active(("p1", 1));
    assert!(!manager.stop(("p9", 9)));
    assert_eq!(manager.len(), 1);
    assert!(!SessionKey::new("p9", 9).record_path(dir.path()).exists());
}

#[test]
fn keys_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let k1 = SessionKey::new("alice", 1);
    let k2 = SessionKey::new("bob", 1);

    let s1 = manager.ensure_active(k1.clone());
    let s2 = manager.ensure_active(k2.clone());
    manager.note_latency(k1.clone(), 7.0);
    thread::sleep(Duration::from_millis(60));

    assert!(manager.stop(k1.clone()));
    assert!(!s1.is_running());
    assert!(s2.is_running());

    assert!(manager.stop(k2.clone()));
    let latency = column("last_request_ms");
    assert!(rows(s2.record_path()).iter().all(|r| r[latency].is_empty()));
    assert_eq!(s1.summary().unwrap().metric("last_request_ms").unwrap().max, 7.0);
}

#[test]
fn last_of_many_latencies_wins() {
    let dir = tempfile::tempdir().unwrap();
    // Long period: the only samples are the first one and the closing one.
    let manager = mock_manager(dir.path(), 60_000);
    let key = SessionKey::new("p1", 1);
    let session = manager.ensure_active(key.clone());
    thread::sleep(Duration::from_millis(20));
    for v in [11.0, 12.0, 13.0] {
        manager.note_latency(key.clone(), v);
    }
    manager.stop(key);

    let data = rows(session.record_path());
    let latency = column("last_request_ms");
    assert_eq!(data.len(), 2);
    assert_eq!(data[0][latency], "");
    assert_eq!(data[1][latency].parse::<f64>().unwrap(), 13.0);
}

#[test]
fn restarted_key_summarizes_only_its_own_rows() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);

    let first = manager.ensure_active(("p1", 1));
    thread::sleep(Duration::from_millis(50));
    manager.stop(("p1", 1));
    let first_rows = first.summary().unwrap().samples;

    let second = manager.ensure_active(("p1", 1));
    thread::sleep(Duration::from_millis(50));
    manager.stop(("p1", 1));
    let second_summary = second.summary().unwrap();

    let total = rows(second.record_path()).len() as u64;
    assert_eq!(first_rows + second_summary.samples, total);
    assert_eq!(second_summary.samples, second.samples_written());
}

/// Answers its first capture at once, then blocks on every later one.
struct Stalling(u32);

impl Probe<AcceleratorReading> for Stalling {
    fn name(&self) -> &'static str {
        "stalling"
    }

    fn capture(&mut self) -> Result<AcceleratorReading, ProbeError> {
        self.0 += 1;
        if self.0 > 1 {
            thread::sleep(Duration::from_millis(300));
        }
        Err(ProbeError::Unsupported)
    }
}

fn process_with_cpu(cpu_percent: f64) -> ProcessReading {
    ProcessReading {
        cpu_percent,
        rss_bytes: 100 * 1024 * 1024,
        vms_bytes: 400 * 1024 * 1024,
        mem_percent: Some(1.0),
        open_handles: Some(12),
    }
}

#[test]
fn detached_loop_never_writes_into_the_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let generation = Arc::new(AtomicU32::new(0));
    let g = Arc::clone(&generation);
    // Session n reports process CPU n; only the first one stalls.
    let factory = move |_: &MetricsConfig| {
        let n = g.fetch_add(1, Ordering::SeqCst) + 1;
        let mut set = mock_set();
        set.process = Box::new(Fixed(process_with_cpu(f64::from(n))));
        if n == 1 {
            set.accelerator = Box::new(Stalling(0));
        }
        set
    };
    let cfg = config(dir.path(), 20).with_join_timeout(Duration::from_millis(10));
    let manager = Manager::with_probe_factory(cfg, Arc::new(factory));
    let key = SessionKey::new("p1", 1);

    let first = manager.ensure_active(key.clone());
    thread::sleep(Duration::from_millis(60));
    assert!(manager.stop(key.clone()));
    let second = manager.ensure_active(key.clone());
    // Let the stalled capture of the first loop finish meanwhile.
    thread::sleep(Duration::from_millis(400));
    assert!(manager.stop(key.clone()));

    let cpu = column("proc_cpu_percent");
    let data = rows(second.record_path());
    let first_rows = data.iter().filter(|r| r[cpu].parse::<f64>().unwrap() == 1.0).count();
    assert_eq!(first_rows as u64, first.summary().unwrap().samples);
    assert_eq!(first_rows as u64, first.samples_written());

    let stats = second.summary().unwrap();
    let second_cpu = stats.metric("proc_cpu_percent").unwrap();
    assert_eq!((second_cpu.min, second_cpu.max), (2.0, 2.0));
    assert_eq!(stats.samples as usize, data.len() - first_rows);
}

#[test]
fn colliding_looking_participants_use_separate_streams() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let spaced = SessionKey::new("a b", 1);
    let underscored = SessionKey::new("a_b", 1);

    let a = manager.ensure_active(spaced.clone());
    let b = manager.ensure_active(underscored.clone());
    assert_ne!(a.record_path(), b.record_path());
    assert_ne!(a.summary_path(), b.summary_path());
    manager.note_latency(spaced.clone(), 42.0);
    thread::sleep(Duration::from_millis(50));
    manager.stop(spaced);
    manager.stop(underscored);

    let a_summary = a.summary().unwrap();
    let b_summary = b.summary().unwrap();
    assert_eq!(a_summary.samples, rows(a.record_path()).len() as u64);
    assert_eq!(b_summary.samples, rows(b.record_path()).len() as u64);
    assert_eq!(a_summary.metric("last_request_ms").unwrap().max, 42.0);
    assert!(b_summary.metric("last_request_ms").is_none());
    assert_eq!(Summary::load(&b.summary_path()).unwrap().participant, "a_b");
}

#[test]
fn stop_all_finalizes_every_session() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let keys = [SessionKey::new("a", 1), SessionKey::new("b", 2)];
    for k in &keys {
        manager.ensure_active(k.clone());
    }
    assert_eq!(manager.stop_all(), 2);
    assert!(manager.is_empty());
    for k in &keys {
        assert!(k.summary_path(dir.path()).exists());
    }
}

// ---------------------------------------------------------------------------
// Record contents
// ---------------------------------------------------------------------------

#[test]
fn uptime_and_io_deltas_are_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 15);
    let session = manager.ensure_active(("p1", 1));
    thread::sleep(Duration::from_millis(80));
    manager.stop(("p1", 1));

    let data = rows(session.record_path());
    assert!(data.len() >= 3);
    let uptime = column("uptime_s");
    let read = column("disk_read_mb");
    let mut last = (0.0f64, 0.0f64);
    for row in &data {
        let u: f64 = row[uptime].parse().unwrap();
        let r: f64 = row[read].parse().unwrap();
        assert!(u >= last.0);
        assert!(r >= last.1);
        assert!(r >= 0.0);
        last = (u, r);
    }
    // Baseline is subtracted: the first row has grown by exactly one step.
    assert_eq!(data[0][read].parse::<f64>().unwrap(), 1.0);
}

#[test]
fn absent_metric_summarizes_to_null() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    manager.ensure_active(("p1", 1));
    manager.stop(("p1", 1));

    let raw = fs::read_to_string(SessionKey::new("p1", 1).summary_path(dir.path())).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(json["metrics"]["gpu_util_percent"].is_null());
    assert!(json["metrics"]["last_request_ms"].is_null());
    assert_eq!(json["metrics"]["sys_ram_percent"]["mean"], 25.0);
}

#[test]
fn traced_memory_is_recorded_with_allocator_installed() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let session = manager.ensure_active(("p1", 1));
    manager.stop(("p1", 1));

    let data = rows(session.record_path());
    let current = column("traced_mem_current_mb");
    let peak = column("traced_mem_peak_mb");
    for row in &data {
        let c: f64 = row[current].parse().unwrap();
        let p: f64 = row[peak].parse().unwrap();
        assert!(c > 0.0);
        assert!(p >= c);
    }
    assert!(session.summary().unwrap().metric("traced_mem_current_mb").is_some());
}

#[test]
fn accelerator_fields_are_empty_cells_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let session = manager.ensure_active(("p1", 1));
    manager.stop(("p1", 1));

    for row in rows(session.record_path()) {
        assert_eq!(row.len(), CSV_COLUMNS.len());
        for name in ["gpu_util_percent", "gpu_mem_used_mb", "gpu_power_w"] {
            assert_eq!(row[column(name)], "");
        }
        assert_eq!(row[column("open_fds")], "12");
    }
}

#[test]
fn accelerator_reading_flows_into_rows() {
    let dir = tempfile::tempdir().unwrap();
    let factory = |_: &MetricsConfig| {
        let mut set = mock_set();
        set.accelerator = Box::new(Fixed(AcceleratorReading {
            util_percent: Some(64.0),
            mem_used_mb: Some(2048.0),
            mem_total_mb: Some(8192.0),
            temp_c: None,
            power_w: None,
        }));
        set
    };
    let manager = Manager::with_probe_factory(config(dir.path(), 20), Arc::new(factory));
    let session = manager.ensure_active(("gpu", 1));
    manager.stop(("gpu", 1));

    let data = rows(session.record_path());
    assert_eq!(data[0][column("gpu_util_percent")].parse::<f64>().unwrap(), 64.0);
    assert_eq!(data[0][column("gpu_temp_c")], "");
    let gpu = session.summary().unwrap();
    assert_eq!(gpu.metric("gpu_util_percent").unwrap().p50, 64.0);
}

// ---------------------------------------------------------------------------
// Platform probes and recovery
// ---------------------------------------------------------------------------

#[test]
fn platform_probes_produce_well_formed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Manager::new(config(dir.path(), 20));
    let session = manager.ensure_active(("host", 1));
    thread::sleep(Duration::from_millis(50));
    manager.stop(("host", 1));

    let data = rows(session.record_path());
    assert!(!data.is_empty());
    for row in &data {
        assert_eq!(row.len(), CSV_COLUMNS.len());
        for name in ["disk_read_mb", "net_bytes_recv_mb"] {
            let cell = &row[column(name)];
            if !cell.is_empty() {
                assert!(cell.parse::<f64>().unwrap() >= 0.0);
            }
        }
    }
}

#[test]
fn stream_can_be_summarized_after_the_fact() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mock_manager(dir.path(), 20);
    let key = SessionKey::new("p1", 4);
    let session = manager.ensure_active(key.clone());
    manager.note_latency(key.clone(), 9.0);
    thread::sleep(Duration::from_millis(50));
    manager.stop(key.clone());

    let recovered_key = SessionKey::from_record_path(session.record_path()).unwrap();
    assert_eq!(recovered_key, key);
    let recovered = summarize_file(session.record_path(), &recovered_key).unwrap();
    let live = session.summary().unwrap();
    assert_eq!(recovered.samples, live.samples);
    assert_eq!(recovered.metrics, live.metrics);
}
