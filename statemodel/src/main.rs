//! Abstract state model engine CLI.
//!
//! Validates configuration, replays recorded traces into a model (persisting
//! it as configured) and inspects persisted stores.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use statemodel::core::error::ModelError;
use statemodel::core::registry::ModelRegistry;
use statemodel::exit_codes;
use statemodel::io::config::{ConfigError, DEFAULT_CONFIG_FILE, load_config};
use statemodel::io::persistence::store::{JsonRecordStore, RecordStore};
use statemodel::io::replay::replay;
use statemodel::io::trace::load_trace;
use statemodel::logging;

#[derive(Parser)]
#[command(
    name = "statemodel",
    version,
    about = "Abstract state model engine for automated exploration"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the configuration and print the model identifier.
    Check {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Replay a recorded trace into the configured model and print a summary.
    Replay {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Trace file (JSON, `schemas/trace/v1.schema.json`).
        #[arg(short, long)]
        trace: PathBuf,
    },
    /// Print per-class record counts of a JSON store.
    Inspect {
        #[arg(short, long)]
        store: PathBuf,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => cmd_check(&config),
        Command::Replay { config, trace } => cmd_replay(&config, &trace),
        Command::Inspect { store } => cmd_inspect(&store),
    }
}

fn cmd_check(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    cfg.abstraction()?;
    println!("{}", cfg.model_identifier());
    Ok(())
}

fn cmd_replay(config_path: &Path, trace_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let trace = load_trace(trace_path)?;
    let summary = replay(&cfg, &trace, &ModelRegistry::new())?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_inspect(store_path: &Path) -> Result<()> {
    if !store_path.exists() {
        bail!("store {} does not exist", store_path.display());
    }
    let store = JsonRecordStore::open(store_path)?;
    for (class, count) in store.counts() {
        println!("{class}\t{count}");
    }
    Ok(())
}

/// Configuration problems get their own code so scripts can tell a broken
/// setup from a failed run.
fn exit_code(err: &anyhow::Error) -> i32 {
    let config_error = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || matches!(
                cause.downcast_ref::<ModelError>(),
                Some(ModelError::Configuration(_))
            )
    });
    if config_error {
        exit_codes::CONFIG
    } else {
        exit_codes::ERROR
    }
}
