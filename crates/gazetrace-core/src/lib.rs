//! # gazetrace-core
//!
//! Resource telemetry for timed gaze-tracking tests.
//!
//! Every (participant, test) pair gets its own background sampling loop that
//! records process, system, I/O, allocator and accelerator usage once per
//! period into an append-only CSV stream, and writes a JSON summary when the
//! session is stopped.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gazetrace_core::{Manager, MetricsConfig};
//!
//! let manager = Manager::new(MetricsConfig::new("data"));
//!
//! // First upload for this participant/test starts sampling.
//! manager.ensure_active(("p1", 1));
//!
//! // Report how long each request took.
//! manager.note_latency(("p1", 1), 42.0);
//!
//! // End of test: stop, flush, summarize.
//! manager.stop(("p1", 1));
//! ```
//!
//! ## Architecture
//!
//! Probes → Assembler → Session loop → record stream → Summary
//!
//! - [`probe`]: one [`Probe`] per resource dimension. Failures become absent
//!   fields, never errors in the loop.
//! - [`sample`]: the fixed record schema and the [`Assembler`] that fills it.
//! - [`session`]: the `Idle → Running → Stopped` lifecycle and its thread.
//! - [`manager`]: the registry enforcing one session per [`SessionKey`].
//! - [`summary`]: min/max/mean/median over a finished stream.
//!
//! Logging goes through the [`log`] facade; install a logger in the binary.

pub mod config;
pub mod error;
pub mod key;
pub mod manager;
pub mod probe;
pub mod sample;
pub mod session;
pub mod stream;
pub mod summary;

pub use config::MetricsConfig;
pub use error::{ProbeError, SummaryError};
pub use key::SessionKey;
pub use manager::Manager;
pub use probe::{
    AcceleratorReading, AllocReading, IoCounters, Probe, ProbeFactory, ProbeSet, ProcessReading,
    SystemReading, TracingAllocator, platform_probes,
};
pub use sample::{Assembler, CSV_COLUMNS, Sample};
pub use session::{Session, SessionState};
pub use stream::RecordStream;
pub use summary::{MetricStats, SUMMARY_METRICS, StreamStats, Summary, read_stream, summarize_file};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
