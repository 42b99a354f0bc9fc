//! `gazetrace summarize`: rebuild a summary from a record stream.
//!
//! Useful after a process was killed before it could stop its sessions: the
//! stream is flushed row by row, so everything up to the kill is there.

use std::path::{Path, PathBuf};

use gazetrace_core::{SUMMARY_METRICS, SessionKey, summarize_file};

use super::opt;

pub fn run(csv: &str, output: Option<&str>) {
    let path = Path::new(csv);
    let Some(key) = SessionKey::from_record_path(path) else {
        eprintln!("Not a record stream name: {csv}");
        eprintln!("Expected metrics_<participant>_test<N>.csv");
        std::process::exit(1);
    };

    let summary = match summarize_file(path, &key) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Cannot summarize {csv}: {e}");
            std::process::exit(1);
        }
    };

    let out = output.map_or_else(
        || key.summary_path(path.parent().unwrap_or(Path::new("."))),
        PathBuf::from,
    );
    if let Err(e) = summary.write_json(&out) {
        eprintln!("Cannot write {}: {e}", out.display());
        std::process::exit(1);
    }

    println!("{key}: {} samples over {:.1}s", summary.samples, summary.duration_s);
    println!();
    println!(
        "  {:<24} {:>10} {:>10} {:>10} {:>10}",
        "metric", "min", "max", "mean", "p50"
    );
    for name in SUMMARY_METRICS {
        let m = summary.metric(name);
        println!(
            "  {:<24} {:>10} {:>10} {:>10} {:>10}",
            name,
            opt(m.map(|m| m.min), 2),
            opt(m.map(|m| m.max), 2),
            opt(m.map(|m| m.mean), 2),
            opt(m.map(|m| m.p50), 2),
        );
    }
    println!();
    println!("Summary written to {}", out.display());
}
