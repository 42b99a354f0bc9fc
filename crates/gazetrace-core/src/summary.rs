//! End-of-session statistics over a record stream.
//!
//! A [`Summary`] is computed once, from the rows on disk rather than from
//! in-memory samples, so a stream left behind by a killed process can be
//! summarized later with [`summarize_file`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SummaryError;
use crate::key::SessionKey;
use crate::sample::{CSV_COLUMNS, csv_header};

/// Columns aggregated into [`Summary::metrics`].
pub const SUMMARY_METRICS: [&str; 7] = [
    "proc_cpu_percent",
    "proc_mem_rss_mb",
    "sys_cpu_percent",
    "sys_ram_percent",
    "traced_mem_current_mb",
    "gpu_util_percent",
    "last_request_ms",
];

/// min / max / mean / median of one column's non-absent values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
}

impl MetricStats {
    /// `None` when `values` is empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let p50 = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            p50,
        })
    }
}

/// Aggregates read back from a record stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub samples: u64,
    /// Uptime of the last row with a readable uptime, 0 when there is none.
    pub duration_s: f64,
    pub first_ts: Option<f64>,
    pub last_ts: Option<f64>,
    /// One entry per [`SUMMARY_METRICS`] column; `None` means no data.
    pub metrics: BTreeMap<String, Option<MetricStats>>,
}

/// Read the stream at `path`, considering only rows starting at byte
/// `offset`. An offset inside the header means "all rows".
///
/// Empty or unparsable cells count as absent. A row with more cells than the
/// header is an error.
pub fn read_stream(path: &Path, offset: u64) -> Result<StreamStats, SummaryError> {
    let text = fs::read_to_string(path)?;
    let header_end = text.find('\n').ok_or(SummaryError::MissingHeader)?;
    let header = text[..header_end].trim_end_matches('\r');
    if header.is_empty() {
        return Err(SummaryError::MissingHeader);
    }
    if header != csv_header() {
        return Err(SummaryError::HeaderMismatch(header.to_string()));
    }

    let start = usize::try_from(offset)
        .unwrap_or(usize::MAX)
        .max(header_end + 1)
        .min(text.len());
    let body = text.get(start..).unwrap_or("");
    let first_line = text.get(..start).unwrap_or("").matches('\n').count() + 1;

    let column = |name: &str| CSV_COLUMNS.iter().position(|c| *c == name);
    let watched: Vec<(&str, usize)> = SUMMARY_METRICS
        .iter()
        .filter_map(|name| column(name).map(|idx| (*name, idx)))
        .collect();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); watched.len()];

    let mut stats = StreamStats::default();
    for (i, line) in body.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() > CSV_COLUMNS.len() {
            return Err(SummaryError::BadRow {
                line: first_line + i,
                detail: format!(
                    "{} cells, header has {}",
                    cells.len(),
                    CSV_COLUMNS.len()
                ),
            });
        }
        let parse = |idx: usize| -> Option<f64> {
            cells
                .get(idx)
                .and_then(|c| c.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        stats.samples += 1;
        if let Some(ts) = parse(0) {
            stats.first_ts.get_or_insert(ts);
            stats.last_ts = Some(ts);
        }
        if let Some(uptime) = parse(1) {
            stats.duration_s = uptime;
        }
        for (slot, (_, idx)) in values.iter_mut().zip(&watched) {
            if let Some(v) = parse(*idx) {
                slot.push(v);
            }
        }
    }

    stats.metrics = watched
        .iter()
        .zip(&values)
        .map(|((name, _), vals)| (name.to_string(), MetricStats::from_values(vals)))
        .collect();
    Ok(stats)
}

/// Persisted end-of-session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub participant: String,
    pub test: u32,
    pub session_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub samples: u64,
    pub duration_s: f64,
    /// The session stopped writing early after a record-stream failure.
    pub degraded: bool,
    pub metrics: BTreeMap<String, Option<MetricStats>>,
}

impl Summary {
    pub fn new(
        key: &SessionKey,
        session_id: impl Into<String>,
        started_at: SystemTime,
        ended_at: SystemTime,
        degraded: bool,
        stats: StreamStats,
    ) -> Self {
        Self {
            participant: key.participant.clone(),
            test: key.test,
            session_id: session_id.into(),
            started_at: format_system_time(started_at),
            ended_at: format_system_time(ended_at),
            samples: stats.samples,
            duration_s: stats.duration_s,
            degraded,
            metrics: stats.metrics,
        }
    }

    /// Write pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), SummaryError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SummaryError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Stats for one summarized column, `None` for no data or unknown names.
    pub fn metric(&self, name: &str) -> Option<&MetricStats> {
        self.metrics.get(name).and_then(Option::as_ref)
    }
}

/// Recompute a summary from a whole stream on disk, e.g. one left behind by
/// a process that never reached `stop()`. Timestamps come from the rows.
pub fn summarize_file(path: &Path, key: &SessionKey) -> Result<Summary, SummaryError> {
    let stats = read_stream(path, 0)?;
    let at = |ts: Option<f64>| {
        ts.and_then(|t| Duration::try_from_secs_f64(t).ok())
            .and_then(|d| UNIX_EPOCH.checked_add(d))
            .unwrap_or(UNIX_EPOCH)
    };
    let started = at(stats.first_ts);
    let ended = at(stats.last_ts);
    Ok(Summary::new(
        key,
        Uuid::new_v4().to_string(),
        started,
        ended,
        false,
        stats,
    ))
}

fn format_system_time(t: SystemTime) -> String {
    format_iso8601(t.duration_since(UNIX_EPOCH).unwrap_or_default())
}

/// `2026-02-15T01:30:00Z`
pub(crate) fn format_iso8601(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Seconds since the Unix epoch to (year, month, day, hour, minute, second)
/// UTC. Leap seconds are ignored.
fn secs_to_utc(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    let mut days = secs / 86400;
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }

    let feb = if is_leap(year) { 29 } else { 28 };
    let months_days: [u64; 12] = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u64;
    for md in months_days {
        if days < md {
            break;
        }
        days -= md;
        month += 1;
    }

    (year, month, days + 1, hour, min, sec)
}

fn is_leap(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
