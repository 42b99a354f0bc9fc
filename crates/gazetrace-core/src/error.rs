//! Error types for probes and summary computation.
//!
//! Neither type ever crosses the lifecycle API: probe errors collapse to absent
//! values in the assembled [`Sample`](crate::sample::Sample), and summary
//! errors are logged and skipped by [`Session::stop`](crate::session::Session::stop).

use thiserror::Error;

/// Why a single probe produced no reading this cycle.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("allocation tracing is not installed")]
    NotInstalled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("`{program}` failed: {detail}")]
    Command { program: &'static str, detail: String },

    #[error("no backend produced a reading")]
    NoBackend,
}

impl ProbeError {
    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            what,
            detail: detail.into(),
        }
    }

    pub(crate) fn command(program: &'static str, detail: impl Into<String>) -> Self {
        Self::Command {
            program,
            detail: detail.into(),
        }
    }
}

/// Failure while turning a record stream into a [`Summary`](crate::summary::Summary).
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record stream has no header row")]
    MissingHeader,

    #[error("unexpected header: {0}")]
    HeaderMismatch(String),

    #[error("line {line}: {detail}")]
    BadRow { line: usize, detail: String },
}
