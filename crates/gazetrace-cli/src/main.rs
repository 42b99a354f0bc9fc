//! CLI for gazetrace: per-test resource telemetry for eye-tracking studies.

mod commands;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gazetrace")]
#[command(about = "gazetrace — resource telemetry for timed gaze-tracking tests")]
#[command(version = gazetrace_core::VERSION)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Sampling options shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Directory for record streams and summaries
    #[arg(long, global = true, default_value = "data")]
    data_dir: String,

    /// Sampling period in milliseconds
    #[arg(long, global = true, default_value = "1000")]
    interval_ms: u64,

    /// How long stop waits for a sampling thread, in milliseconds
    #[arg(long, global = true, default_value = "2000")]
    join_timeout_ms: u64,

    /// Skip accelerator probing (nvidia-smi, DRM sysfs)
    #[arg(long, global = true)]
    no_accelerator: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one participant/test session in the foreground until Ctrl+C
    /// or the duration elapses, then write its summary
    Record {
        /// Participant identifier
        #[arg(long)]
        participant: String,

        /// Test number
        #[arg(long)]
        test: u32,

        /// Maximum recording duration (e.g. "30s", "5m", "1h")
        #[arg(long, value_parser = commands::parse_duration)]
        duration: Option<std::time::Duration>,

        /// Report this request latency (ms) once per sampling period
        #[arg(long)]
        latency_ms: Option<f64>,
    },

    /// Assemble one sample from the platform probes and print it
    Probe {
        /// Print the sample as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute a summary from an existing record stream
    Summarize {
        /// Path to a metrics_<participant>_test<N>.csv file
        csv: String,

        /// Where to write the summary (default: next to the CSV)
        #[arg(long)]
        output: Option<String>,
    },

    /// List session summaries found in the data directory
    Sessions {
        /// Directory to scan (default: --data-dir)
        #[arg(long)]
        dir: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = commands::metrics_config(&cli.global);

    match cli.command {
        Commands::Record {
            participant,
            test,
            duration,
            latency_ms,
        } => commands::record::run(
            config,
            &participant,
            test,
            duration,
            latency_ms,
        ),
        Commands::Probe { json } => commands::probe::run(&config, json),
        Commands::Summarize { csv, output } => {
            commands::summarize::run(&csv, output.as_deref())
        }
        Commands::Sessions { dir } => {
            let dir = dir.unwrap_or(cli.global.data_dir);
            commands::sessions::run(&dir)
        }
    }
}
