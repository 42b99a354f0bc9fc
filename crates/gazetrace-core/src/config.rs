//! Sampling configuration shared by the manager and its sessions.

use std::path::PathBuf;
use std::time::Duration;

/// Default sampling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
/// Default bound on how long `stop()` waits for a sampling thread.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Default bound on an external accelerator query.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(400);

/// Configuration for a [`Manager`](crate::manager::Manager) and every session it creates.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Directory holding record streams and summaries. Created on demand.
    pub data_dir: PathBuf,
    /// Sampling period.
    pub interval: Duration,
    /// How long `stop()` waits for the loop thread before finalizing anyway.
    pub join_timeout: Duration,
    /// Whether accelerator backends are queried at all.
    pub accelerator: bool,
    /// Upper bound on a single accelerator tool invocation.
    pub command_timeout: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            interval: DEFAULT_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            accelerator: true,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl MetricsConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        // A zero period would spin the loop.
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_accelerator(mut self, enabled: bool) -> Self {
        self.accelerator = enabled;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}
