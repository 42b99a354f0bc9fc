//! One sampling lifecycle bound to a single (participant, test) key.
//!
//! A [`Session`] moves `Idle -> Running -> Stopped` and never back. While
//! running it owns a named background thread that assembles a [`Sample`],
//! appends it to the record stream, flushes, and then waits on a condition
//! variable until the next period boundary or a stop request.
//!
//! [`Session::stop`] waits for the thread for at most
//! [`MetricsConfig::join_timeout`]. If the thread has not exited by then it is
//! detached and the summary is computed from the rows flushed so far. A
//! detached loop never appends again, so a sample still in flight at that
//! moment is lost rather than leaking into a later session's rows.
//!
//! [`Sample`]: crate::sample::Sample

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

use crate::config::MetricsConfig;
use crate::error::SummaryError;
use crate::key::SessionKey;
use crate::probe::ProbeSet;
use crate::sample::Assembler;
use crate::stream::RecordStream;
use crate::summary::{self, Summary};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Control {
    state: SessionState,
    stop_requested: bool,
    loop_done: bool,
}

/// State shared between the session handle and its loop thread.
struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    degraded: AtomicBool,
    samples: AtomicU64,
    /// Held by the loop for each append. `false` once stop gave up waiting.
    appends_open: Mutex<bool>,
}

impl Shared {
    fn new() -> Self {
        Self {
            control: Mutex::new(Control {
                state: SessionState::Idle,
                stop_requested: false,
                loop_done: false,
            }),
            wake: Condvar::new(),
            degraded: AtomicBool::new(false),
            samples: AtomicU64::new(0),
            appends_open: Mutex::new(true),
        }
    }
}

/// Marks the loop finished even if it unwinds.
struct DoneGuard<'a>(&'a Shared);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        lock(&self.0.control).loop_done = true;
        self.0.wake.notify_all();
    }
}

/// Set once by `start()`.
struct Run {
    thread: JoinHandle<RecordStream>,
    started_at: SystemTime,
    started: Instant,
    data_start: u64,
}

pub struct Session {
    key: SessionKey,
    id: String,
    config: MetricsConfig,
    record_path: PathBuf,
    probes: Mutex<Option<ProbeSet>>,
    shared: Arc<Shared>,
    latency_tx: Mutex<Option<Sender<f64>>>,
    run: Mutex<Option<Run>>,
    summary: Mutex<Option<Summary>>,
}

impl Session {
    /// A new idle session. Nothing touches the disk until [`Session::start`].
    pub fn new(key: SessionKey, config: MetricsConfig, probes: ProbeSet) -> Self {
        let record_path = key.record_path(&config.data_dir);
        Self {
            key,
            id: Uuid::new_v4().to_string(),
            config,
            record_path,
            probes: Mutex::new(Some(probes)),
            shared: Arc::new(Shared::new()),
            latency_tx: Mutex::new(None),
            run: Mutex::new(None),
            summary: Mutex::new(None),
        }
    }

    /// Move `Idle -> Running` and spawn the sampling thread.
    ///
    /// The start mark and I/O baseline are taken here, not at construction.
    /// Returns `false` without effect if the session is not idle.
    pub fn start(&self) -> bool {
        // `run` stays locked until the thread is handed over, so a racing
        // stop() waits for it. `control` is released before any disk I/O.
        let mut run = lock(&self.run);
        let probes = {
            let mut control = lock(&self.shared.control);
            if control.state != SessionState::Idle {
                return false;
            }
            let Some(probes) = lock(&self.probes).take() else {
                return false;
            };
            control.state = SessionState::Running;
            probes
        };

        let stream = match RecordStream::open(&self.record_path) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!(
                    "session {}: cannot open {}: {e}; session degraded",
                    self.key,
                    self.record_path.display()
                );
                self.shared.degraded.store(true, Ordering::Relaxed);
                return true;
            }
        };

        let (tx, rx) = mpsc::channel();
        *lock(&self.latency_tx) = Some(tx);
        let assembler = Assembler::start(probes, rx);
        let started_at = SystemTime::now();
        let started = Instant::now();
        let data_start = stream.data_start();

        let shared = Arc::clone(&self.shared);
        let interval = self.config.interval;
        let spawned = thread::Builder::new()
            .name(format!("gazetrace-{}", self.key.file_stem()))
            .spawn(move || sampling_loop(&shared, assembler, stream, interval));

        match spawned {
            Ok(thread) => {
                *run = Some(Run {
                    thread,
                    started_at,
                    started,
                    data_start,
                });
                log::info!(
                    "session {} started (id {}) -> {}",
                    self.key,
                    self.id,
                    self.record_path.display()
                );
            }
            Err(e) => {
                log::warn!("session {}: cannot spawn sampling thread: {e}", self.key);
                self.shared.degraded.store(true, Ordering::Relaxed);
                lock(&self.latency_tx).take();
            }
        }
        true
    }

    /// Queue a latency observation for the next sample. Ignored unless running.
    pub fn note_latency(&self, value_ms: f64) {
        if !value_ms.is_finite() {
            log::debug!("session {}: ignoring latency {value_ms}", self.key);
            return;
        }
        if let Some(tx) = lock(&self.latency_tx).as_ref() {
            // The receiver only goes away with the loop, after stop.
            let _ = tx.send(value_ms);
        }
    }

    /// Stop sampling, close the stream, and write the summary.
    ///
    /// Returns `false` if the session was already stopped. Summary failures
    /// are logged and skipped; the transition itself always completes.
    pub fn stop(&self) -> bool {
        let previous = {
            let mut control = lock(&self.shared.control);
            let previous = control.state;
            if previous == SessionState::Stopped {
                return false;
            }
            control.state = SessionState::Stopped;
            control.stop_requested = true;
            self.shared.wake.notify_all();
            previous
        };

        if previous == SessionState::Idle {
            log::debug!("session {} stopped before it started", self.key);
            return true;
        }
        let run = lock(&self.run).take();
        lock(&self.latency_tx).take();
        let Some(Run {
            thread,
            started_at,
            started,
            data_start,
        }) = run
        else {
            log::info!("session {} stopped; nothing was recorded", self.key);
            return true;
        };

        if self.wait_for_loop(self.config.join_timeout) {
            match thread.join() {
                Ok(stream) => {
                    if let Err(e) = stream.close() {
                        log::warn!("session {}: closing record stream: {e}", self.key);
                    }
                }
                Err(_) => log::warn!("session {}: sampling thread panicked", self.key),
            }
        } else {
            *lock(&self.shared.appends_open) = false;
            log::warn!(
                "session {}: sampling thread did not exit within {:?}; \
                 detached, summarizing rows flushed so far",
                self.key,
                self.config.join_timeout
            );
        }

        match self.finalize(started_at, data_start) {
            Ok(summary) => {
                log::info!(
                    "session {} stopped: {} samples in {:.1}s",
                    self.key,
                    summary.samples,
                    started.elapsed().as_secs_f64()
                );
                *lock(&self.summary) = Some(summary);
            }
            Err(e) => log::warn!("session {}: summary skipped: {e}", self.key),
        }
        true
    }

    fn wait_for_loop(&self, timeout: Duration) -> bool {
        let control = lock(&self.shared.control);
        let (control, _) = self
            .shared
            .wake
            .wait_timeout_while(control, timeout, |c| !c.loop_done)
            .unwrap_or_else(PoisonError::into_inner);
        control.loop_done
    }

    fn finalize(
        &self,
        started_at: SystemTime,
        data_start: u64,
    ) -> Result<Summary, SummaryError> {
        let stats = summary::read_stream(&self.record_path, data_start)?;
        let summary = Summary::new(
            &self.key,
            self.id.as_str(),
            started_at,
            SystemTime::now(),
            self.is_degraded(),
            stats,
        );
        summary.write_json(&self.summary_path())?;
        Ok(summary)
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// UUID identifying this session instance.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared.control).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Whether writing stopped early after a record-stream failure.
    pub fn is_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::Relaxed)
    }

    /// Rows appended so far.
    pub fn samples_written(&self) -> u64 {
        self.shared.samples.load(Ordering::Relaxed)
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn summary_path(&self) -> PathBuf {
        self.key.summary_path(&self.config.data_dir)
    }

    /// The summary written by `stop()`, if it succeeded.
    pub fn summary(&self) -> Option<Summary> {
        lock(&self.summary).clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Sample, append, wait; repeat until stopped. A stop request still gets one
/// closing sample so latency reported since the last cycle is recorded.
fn sampling_loop(
    shared: &Shared,
    mut assembler: Assembler,
    mut stream: RecordStream,
    interval: Duration,
) -> RecordStream {
    let _done = DoneGuard(shared);
    let mut next = Instant::now();
    let mut stopping = false;

    loop {
        let sample = assembler.assemble();
        let appended = {
            let open = lock(&shared.appends_open);
            if !*open {
                log::debug!("{}: detached, dropping sample", stream.path().display());
                break;
            }
            stream.append(&sample)
        };
        if let Err(e) = appended {
            log::warn!(
                "write to {} failed: {e}; session degraded",
                stream.path().display()
            );
            shared.degraded.store(true, Ordering::Relaxed);
            break;
        }
        shared.samples.fetch_add(1, Ordering::Relaxed);
        if stopping {
            break;
        }

        next += interval;
        let now = Instant::now();
        if next < now {
            // Fell behind; don't burst to catch up.
            next = now;
        }
        let control = lock(&shared.control);
        let (control, _) = shared
            .wake
            .wait_timeout_while(control, next - now, |c| !c.stop_requested)
            .unwrap_or_else(PoisonError::into_inner);
        stopping = control.stop_requested;
    }
    stream
}
