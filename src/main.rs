//! keirin-bankroll: bankroll ledger for keirin betting.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches one batch job per invocation: the morning `place` run, the
//! evening `settle` run, backtests, maintenance, or the read-only dashboard.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use keirin_bankroll::backtest::{demo_races, generate_backtest_report, Backtester};
use keirin_bankroll::config::AppConfig;
use keirin_bankroll::dashboard::{self, DashboardState};
use keirin_bankroll::engine::BankrollManager;
use keirin_bankroll::storage::SystemClock;
use keirin_bankroll::types::{BetRecord, Prediction, RaceOutcome, SimulatedRace};

#[derive(Parser)]
#[command(name = "keirin-bankroll")]
#[command(version, about = "Bankroll ledger and risk gate for keirin betting", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ledger report
    Report,

    /// Print whether betting is currently allowed
    Check,

    /// Place predictions from a JSON file (one record or an array)
    Place {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Settle open bets against race outcomes from a JSON file
    Settle {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Replay historical races through the betting strategy
    Backtest {
        /// JSON array of races with their actual results
        #[arg(
            short,
            long,
            value_name = "FILE",
            conflicts_with = "demo",
            required_unless_present = "demo"
        )]
        input: Option<PathBuf>,

        /// Use generated demo races instead of a file
        #[arg(long)]
        demo: bool,

        /// Seed for the demo race generator
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Number of demo races
        #[arg(long, default_value_t = 30)]
        count: usize,

        /// Minimum confidence to bet, overriding the config
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Append a post-race reflection to the learning log
    Learn {
        #[arg(long)]
        race_id: String,
        /// What was predicted
        #[arg(long, default_value = "")]
        prediction: String,
        /// What actually happened
        #[arg(long, default_value = "")]
        result: String,
        #[arg(long)]
        reflection: String,
    },

    /// Print pattern aggregates and recent mistakes as JSON
    Snapshot,

    /// Lift today's stop after a manual review
    Resume,

    /// Discard the ledger and start from the initial bankroll
    Reset,

    /// Serve the read-only dashboard
    Serve {
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();
    init_logging();

    let cli = Cli::parse();
    let cfg = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(cfg.dashboard.port);
            let state = Arc::new(DashboardState::from_config(&cfg)?);
            dashboard::serve(state, port).await
        }
        command => run_job(command, &cfg),
    }
}

/// Run one synchronous batch job against the ledger.
fn run_job(command: Commands, cfg: &AppConfig) -> Result<()> {
    let mut manager = BankrollManager::open(cfg, Arc::new(SystemClock))?;

    match command {
        Commands::Report => println!("{}", manager.generate_report()),
        Commands::Check => {
            let verdict = manager.can_bet()?;
            println!("{verdict}");
            println!("Bankroll: {}", manager.current_bankroll());
        }
        Commands::Place { input } => {
            let predictions: Vec<Prediction> = read_records(&input)?;
            let placed = manager.place_batch(&predictions)?;
            info!(
                requested = predictions.len(),
                placed = placed.len(),
                bankroll = manager.current_bankroll(),
                "Placement run complete"
            );
            print_records(&placed)?;
        }
        Commands::Settle { input } => {
            let outcomes: Vec<RaceOutcome> = read_records(&input)?;
            let settled = manager.settle_outcomes(&outcomes)?;
            print_records(&settled)?;
            println!("{}", manager.generate_report());
        }
        Commands::Backtest {
            input,
            seed,
            count,
            threshold,
            ..
        } => {
            // clap guarantees exactly one of --input and --demo.
            let races: Vec<SimulatedRace> = match input {
                Some(path) => read_records(&path)?,
                None => demo_races(seed, count),
            };
            let mut config = cfg.backtest.backtest_config();
            if let Some(threshold) = threshold {
                config.confidence_threshold = threshold;
            }
            let result = Backtester::new(config).run_and_record(&races, &mut manager)?;
            println!("{}", generate_backtest_report(&result));
        }
        Commands::Learn {
            race_id,
            prediction,
            result,
            reflection,
        } => {
            manager.append_learning_log(&race_id, &prediction, &result, &reflection)?;
            info!(%race_id, "Learning log appended");
        }
        Commands::Snapshot => println!(
            "{}",
            serde_json::to_string_pretty(&manager.learning_snapshot())
                .context("Failed to serialise learning snapshot")?
        ),
        Commands::Resume => {
            manager.resume()?;
            println!("{}", manager.can_bet()?);
        }
        Commands::Reset => {
            manager.full_reset()?;
            println!("{}", manager.generate_report());
        }
        Commands::Serve { .. } => anyhow::bail!("serve is not a batch job"),
    }
    Ok(())
}

/// A file holding either a single record or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: OneOrMany<T> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(match records {
        OneOrMany::Many(records) => records,
        OneOrMany::One(record) => vec![record],
    })
}

fn print_records(records: &[BetRecord]) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(records).context("Failed to serialise bet records")?
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keirin_bankroll=info"));

    let json_logging = std::env::var("KEIRIN_LOG_JSON").is_ok();

    // Logs go to stderr so job output on stdout stays machine-readable.
    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtest_needs_a_race_source() {
        assert!(Cli::try_parse_from(["keirin-bankroll", "backtest"]).is_err());
        assert!(Cli::try_parse_from(["keirin-bankroll", "backtest", "--demo"]).is_ok());
        assert!(Cli::try_parse_from(["keirin-bankroll", "backtest", "-i", "races.json"]).is_ok());
        assert!(
            Cli::try_parse_from(["keirin-bankroll", "backtest", "--demo", "-i", "races.json"])
                .is_err()
        );
    }
}
