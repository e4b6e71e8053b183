//! Dining Philosophers CLI.
//!
//! Commands:
//! - (default): Run one room of N philosophers and print the meal record
//! - stress: Run many seeded rooms and report how often all philosophers finished

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use philosophers_experiment::results::{format_duration, timestamped_path};
use philosophers_experiment::stress::{StressConfig, StressRunner};
use philosophers_kernel::{DelayConfig, Room, RoomConfig, TracingSink};

#[derive(Parser)]
#[command(name = "philosophers")]
#[command(version)]
#[command(about = "Dining philosophers with a separate chair for hand-preference negotiation")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Event log file
    #[arg(long, global = true, default_value = "log.txt")]
    log_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct RunArgs {
    /// Number of philosophers (and chairs, and forks)
    size: Option<usize>,

    /// Room configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Shortest pause in milliseconds
    #[arg(long)]
    think_min_ms: Option<u64>,

    /// Longest pause in milliseconds
    #[arg(long)]
    think_max_ms: Option<u64>,

    /// Save the full report as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run many seeded rooms to measure liveness
    Stress {
        /// Number of trials per ring size
        #[arg(long, default_value = "20")]
        trials: usize,

        /// Ring sizes to test (comma-separated)
        #[arg(long, default_value = "1,2,3,5,8", value_delimiter = ',')]
        sizes: Vec<usize>,

        /// Longest pause in milliseconds
        #[arg(long, default_value = "5")]
        think_max_ms: u64,

        /// Seconds before a trial counts as stalled
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// Seed of the first trial
        #[arg(long)]
        seed: Option<u64>,

        /// Also log every philosopher event
        #[arg(long)]
        trace_events: bool,

        /// Output file for results
        #[arg(long, default_value = "stress.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_file, cli.verbose)?;

    match cli.command {
        None => run_room(cli.run).await,
        Some(Commands::Stress {
            trials,
            sizes,
            think_max_ms,
            timeout_secs,
            seed,
            trace_events,
            output,
        }) => {
            let config = StressConfig {
                trials,
                sizes,
                think: DelayConfig {
                    min_ms: 0,
                    max_ms: think_max_ms,
                },
                timeout: Duration::from_secs(timeout_secs),
                base_seed: seed,
                trace_events,
            };
            run_stress(config, &output).await
        }
    }
}

/// Send all tracing output to the event log file.
fn init_logging(path: &Path, verbose: bool) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .compact()
        .init();
    Ok(())
}

async fn run_room(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RoomConfig::load(path)?,
        None => RoomConfig::default(),
    };
    if let Some(size) = args.size {
        config.size = size;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(min_ms) = args.think_min_ms {
        config.think.min_ms = min_ms;
    }
    if let Some(max_ms) = args.think_max_ms {
        config.think.max_ms = max_ms;
    }

    let room = Arc::new(Room::new(config)?);
    info!(size = room.size(), seed = room.seed(), "Philosophers entering");

    let report = room.run(Arc::new(TracingSink)).await?;

    println!("All philosophers left, main process returning");
    for meal in &report.meals {
        println!("{}", meal);
    }

    if let Some(output) = args.output {
        report.save(&output)?;
        info!(path = %output.display(), "Report saved");
    }
    Ok(())
}

async fn run_stress(config: StressConfig, output: &Path) -> Result<()> {
    let runner = StressRunner::new(config);
    let results = runner.run().await?;

    let output_path = timestamped_path(output);
    results.save(&output_path)?;

    println!("\n=== Stress Run Complete ===");
    println!("Results saved to: {}", output_path.display());
    println!(
        "\n  {:>4} {:>6} {:>10} {:>16} {:>7} {:>9} {:>10}",
        "N", "Trials", "Finished", "95% CI", "Stalls", "Failures", "Avg time"
    );
    for summary in results.summary.values() {
        println!(
            "  {:>4} {:>6} {:>9.1}% {:>7.1}%-{:>6.1}% {:>7} {:>9} {:>10}",
            summary.size,
            summary.trials,
            summary.completion_rate * 100.0,
            summary.completion_rate_ci.0 * 100.0,
            summary.completion_rate_ci.1 * 100.0,
            summary.stalls,
            summary.failures,
            format_duration(summary.avg_elapsed_ms as u64),
        );
    }

    let violations = results.total_violations();
    if violations > 0 {
        println!("\nProtocol violations: {}", violations);
    }
    Ok(())
}
