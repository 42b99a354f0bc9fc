//! `gazetrace record`: run one managed session in the foreground.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gazetrace_core::{Manager, MetricsConfig, SessionKey};

use super::opt;

/// Run the record command.
pub fn run(
    config: MetricsConfig,
    participant: &str,
    test: u32,
    max_duration: Option<Duration>,
    latency_ms: Option<f64>,
) {
    let interval = config.interval;
    let key = SessionKey::new(participant, test);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let manager = Manager::new(config);
    let session = manager.ensure_active(key.clone());

    println!("Recording {key}");
    println!("  Session:   {}", session.id());
    println!("  Interval:  {}ms", interval.as_millis());
    match max_duration {
        Some(d) => println!("  Duration:  {}s", d.as_secs()),
        None => println!("  Duration:  until Ctrl+C"),
    }
    println!("  Stream:    {}", session.record_path().display());
    println!();

    let start = Instant::now();
    let mut next_latency = Instant::now();
    while running.load(Ordering::SeqCst) {
        if max_duration.is_some_and(|max| start.elapsed() >= max) {
            break;
        }
        let due = Instant::now() >= next_latency;
        if let Some(ms) = latency_ms.filter(|_| due) {
            manager.note_latency(key.clone(), ms);
            next_latency += interval;
        }
        print!(
            "\r  Samples: {:<8} Elapsed: {:.1}s",
            session.samples_written(),
            start.elapsed().as_secs_f64()
        );
        let _ = std::io::Write::flush(&mut std::io::stdout());
        std::thread::sleep(Duration::from_millis(50));
    }
    println!();
    println!();

    manager.stop_all();

    if session.is_degraded() {
        eprintln!("Recording stopped early: the record stream could not be written.");
    }
    match session.summary() {
        Some(summary) => {
            println!("Session saved");
            println!("  {}  — per-sample records", session.record_path().display());
            println!("  {}  — summary", session.summary_path().display());
            println!();
            println!(
                "  {} samples over {:.1}s, process CPU p50 {}%, last request p50 {} ms",
                summary.samples,
                summary.duration_s,
                opt(summary.metric("proc_cpu_percent").map(|m| m.p50), 1),
                opt(summary.metric("last_request_ms").map(|m| m.p50), 1),
            );
        }
        None => {
            eprintln!("No summary was written; see the log for the cause.");
            std::process::exit(1);
        }
    }
}
