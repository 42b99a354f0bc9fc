//! `gazetrace probe`: assemble and print one sample.

use std::sync::mpsc;
use std::time::Duration;

use gazetrace_core::{Assembler, MetricsConfig, ProbeSet};

use super::opt;

/// CPU figures are deltas, so wait this long after priming.
const WINDOW: Duration = Duration::from_millis(250);

pub fn run(config: &MetricsConfig, json: bool) {
    let (_tx, rx) = mpsc::channel();
    let mut assembler = Assembler::start(ProbeSet::detect(config), rx);
    std::thread::sleep(WINDOW);
    let s = assembler.assemble();

    if json {
        match serde_json::to_string_pretty(&s) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("Error serializing sample: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Process");
    println!("  CPU:        {} %", opt(s.proc_cpu_percent, 1));
    println!("  RSS:        {} MiB", opt(s.proc_mem_rss_mb, 1));
    println!("  VMS:        {} MiB", opt(s.proc_mem_vms_mb, 1));
    println!("  Memory:     {} %", opt(s.proc_mem_pct, 2));
    println!(
        "  Open fds:   {}",
        s.open_fds.map_or_else(|| "-".to_string(), |n| n.to_string())
    );
    println!();
    println!("System");
    println!("  CPU:        {} %", opt(s.sys_cpu_percent, 1));
    println!(
        "  RAM:        {} MiB used, {} MiB available ({} %)",
        opt(s.sys_ram_used_mb, 0),
        opt(s.sys_ram_available_mb, 0),
        opt(s.sys_ram_percent, 1)
    );
    println!(
        "  Swap:       {} MiB ({} %)",
        opt(s.sys_swap_used_mb, 0),
        opt(s.sys_swap_percent, 1)
    );
    println!(
        "  I/O:        disk {} / {} MiB r/w, net {} / {} MiB tx/rx over {:.2}s",
        opt(s.disk_read_mb, 3),
        opt(s.disk_write_mb, 3),
        opt(s.net_bytes_sent_mb, 3),
        opt(s.net_bytes_recv_mb, 3),
        s.uptime_s
    );
    println!();
    println!("Accelerator");
    if s.gpu_util_percent.is_none() && s.gpu_mem_total_mb.is_none() {
        println!("  none detected");
    } else {
        println!("  Util:       {} %", opt(s.gpu_util_percent, 0));
        println!(
            "  Memory:     {} / {} MiB",
            opt(s.gpu_mem_used_mb, 0),
            opt(s.gpu_mem_total_mb, 0)
        );
        println!("  Temp:       {} °C", opt(s.gpu_temp_c, 0));
        println!("  Power:      {} W", opt(s.gpu_power_w, 1));
    }
}
