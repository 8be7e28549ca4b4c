//! Headless scenario runner.
//!
//! Reports go to stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p waymark_headless -- run --scenario scenarios/crossing.ron --ticks 600
//! cargo run -p waymark_headless -- path --scenario scenarios/crossing.ron \
//!     --archetype climber --from 0.5,0.5 --to 11.5,0.5
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waymark_headless::{query_path, Scenario, ScenarioRunner};

#[derive(Parser)]
#[command(name = "waymark_headless")]
#[command(about = "Headless movement scenario runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print the report
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Tick limit (defaults to the scenario's own)
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Plan a single path on a scenario's map
    Path {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Archetype whose movement rules to use
        #[arg(short, long)]
        archetype: String,

        /// Start position as `x,y`
        #[arg(long, value_parser = parse_point)]
        from: (f64, f64),

        /// Goal position as `x,y`
        #[arg(long, value_parser = parse_point)]
        to: (f64, f64),
    },
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in `{s}`: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in `{s}`: {e}"))?;
    Ok((x, y))
}

fn main() {
    let cli = Cli::parse();

    // Logs to stderr (stdout is for reports). RUST_LOG overrides the level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { scenario, ticks } => cmd_run(&scenario, ticks, cli.pretty),
        Commands::Path {
            scenario,
            archetype,
            from,
            to,
        } => cmd_path(&scenario, &archetype, from, to, cli.pretty),
    }
}

fn load_or_exit(path: &std::path::Path) -> Scenario {
    match Scenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            tracing::error!("Failed to load scenario: {e}");
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match output {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("Failed to serialize report: {e}");
            std::process::exit(1);
        }
    }
}

/// Run a scenario to its tick limit or until it settles
fn cmd_run(path: &std::path::Path, ticks: Option<u64>, pretty: bool) {
    let scenario = load_or_exit(path);
    let max_ticks = ticks.unwrap_or(scenario.max_ticks);

    let mut runner = match ScenarioRunner::new(&scenario) {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!("Failed to set up scenario: {e}");
            std::process::exit(1);
        }
    };

    let report = runner.run(max_ticks);
    tracing::info!(
        ticks = report.ticks,
        events = report.events.len(),
        state_hash = report.state_hash,
        "Scenario complete"
    );
    print_json(&report, pretty);
}

/// Answer one path query
fn cmd_path(path: &std::path::Path, archetype: &str, from: (f64, f64), to: (f64, f64), pretty: bool) {
    let scenario = load_or_exit(path);
    match query_path(&scenario, archetype, from, to) {
        Ok(report) => print_json(&report, pretty),
        Err(e) => {
            tracing::error!("Path query failed: {e}");
            std::process::exit(1);
        }
    }
}
