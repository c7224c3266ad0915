//! demand-risk: daily retail-demand risk monitor.
//!
//! Single-binary batch job that:
//! 1. Reads the daily demand series from the artifact store
//! 2. Advances the processing cursor by one day (or catches up)
//! 3. Forecasts, scores residuals, and classifies risk
//! 4. Writes the enriched history, latest snapshot, and cursor
//!
//! The query subcommands print JSON projections of the stored artifacts.

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use artifact_store::LocalStore;
use common::MonitorConfig;
use risk_engine::{RiskQuery, RunOutcome, Scheduler};

/// Daily demand risk monitor
#[derive(Parser)]
#[command(name = "demand-risk", about = "Incremental demand anomaly and risk scoring")]
struct Cli {
    /// Path to a TOML config file (default: ./config.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process the next unprocessed day.
    Run {
        /// Keep advancing until the cursor reaches the last date.
        #[arg(long)]
        catch_up: bool,

        /// Upper bound on days processed with --catch-up.
        #[arg(long, default_value_t = 10_000)]
        max_steps: usize,
    },
    /// Print the latest processed day.
    Latest,
    /// Print the most recent days, newest first.
    History {
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Print the most recent anomalous days, newest first.
    Anomalies {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print headline counts across the stored history.
    Summary,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), value)?;
    println!();
    Ok(())
}

fn run(cli: Cli, cfg: MonitorConfig) -> anyhow::Result<()> {
    // The store is chosen once here and handed to everything that needs it.
    let store = LocalStore::new(&cfg.store.root);
    info!(
        "Artifact store: {} (source={})",
        store.root().display(),
        cfg.store.source_key
    );

    match cli.command {
        Command::Run {
            catch_up,
            max_steps,
        } => {
            info!(
                "Model: season_length={}, window={}, policy={}",
                cfg.model.season_length,
                cfg.model.window,
                cfg.risk.policy.as_str()
            );
            let scheduler = Scheduler::new(store, cfg);
            if catch_up {
                let reports = scheduler
                    .catch_up(max_steps)
                    .context("catch-up run failed")?;
                if let Some(last) = reports.last() {
                    info!("Cursor now at {}", last.target);
                }
            } else {
                match scheduler.run_once().context("pipeline run failed")? {
                    RunOutcome::Advanced(report) => {
                        info!(
                            "Cursor advanced {} -> {}",
                            report.previous.label(),
                            report.target
                        );
                    }
                    RunOutcome::CaughtUp { .. } => {
                        info!("No new data to process.");
                    }
                    RunOutcome::AwaitingHistory { rows, required } => {
                        info!("Waiting for history ({}/{} rows).", rows, required);
                    }
                }
            }
            info!("Daily risk monitoring completed successfully.");
        }
        Command::Latest => {
            print_json(&RiskQuery::new(store, &cfg.store).latest()?)?;
        }
        Command::History { limit } => {
            print_json(&RiskQuery::new(store, &cfg.store).history(limit)?)?;
        }
        Command::Anomalies { limit } => {
            print_json(&RiskQuery::new(store, &cfg.store).anomalies(limit)?)?;
        }
        Command::Summary => {
            print_json(&RiskQuery::new(store, &cfg.store).summary()?)?;
        }
    }
    Ok(())
}

fn main() {
    // Initialize logging on stderr; stdout carries query output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "demand_risk=info,risk_engine=info,artifact_store=info".into()
            }),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, cfg) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
