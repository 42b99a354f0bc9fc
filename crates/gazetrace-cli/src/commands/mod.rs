pub mod probe;
pub mod record;
pub mod sessions;
pub mod summarize;

use std::time::Duration;

use gazetrace_core::MetricsConfig;

use crate::GlobalArgs;

/// Map the global flags onto a [`MetricsConfig`].
pub fn metrics_config(args: &GlobalArgs) -> MetricsConfig {
    MetricsConfig::new(&args.data_dir)
        .with_interval(Duration::from_millis(args.interval_ms))
        .with_join_timeout(Duration::from_millis(args.join_timeout_ms))
        .with_accelerator(!args.no_accelerator)
}

/// Format an optional value, or `-` when absent.
pub fn opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

/// Parse a recording duration such as "90s", "5m", "1h" or "250ms".
/// A bare number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let s = raw.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}: expected e.g. 30s, 5m, 1h"))?;
    let millis_per_unit: u64 = match unit {
        "ms" => 1,
        "" | "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => return Err(format!("unknown duration unit {other:?} in {raw:?}")),
    };
    value
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration {raw:?} is too long"))
}
