//! `gazetrace sessions`: list recorded sessions in a data directory.

use std::path::{Path, PathBuf};

use gazetrace_core::{SessionKey, Summary};

/// Run the sessions command.
pub fn run(dir: &str) {
    let data_dir = PathBuf::from(dir);
    let entries = match std::fs::read_dir(&data_dir) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to read {dir}: {e}");
            eprintln!("Record a session first: gazetrace record --participant <id> --test <n>");
            std::process::exit(1);
        }
    };

    let mut summaries: Vec<Summary> = Vec::new();
    let mut orphans: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(key) = SessionKey::from_record_path(&path) else {
            continue;
        };
        match Summary::load(&key.summary_path(&data_dir)) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                log::debug!("{}: {e}", path.display());
                orphans.push(path);
            }
        }
    }

    if summaries.is_empty() && orphans.is_empty() {
        println!("No sessions found in {dir}/");
        return;
    }

    summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    println!(
        "{:<24} {:>5} {:<22} {:>8} {:>10}  flags",
        "participant", "test", "started", "samples", "duration"
    );
    for s in &summaries {
        println!(
            "{:<24} {:>5} {:<22} {:>8} {:>9.1}s  {}",
            s.participant,
            s.test,
            s.started_at,
            s.samples,
            s.duration_s,
            if s.degraded { "degraded" } else { "" }
        );
    }

    if !orphans.is_empty() {
        orphans.sort();
        println!();
        println!("Streams without a readable summary:");
        for path in &orphans {
            println!("  {}", display_name(path));
        }
        println!("Rebuild with: gazetrace summarize <csv>");
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
