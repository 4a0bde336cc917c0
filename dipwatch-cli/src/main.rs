//! dipwatch CLI: ingestion, queries, provider probes.
//!
//! Commands:
//! - `watch`: admit identifiers from JSON lines on stdin and run them to an outcome
//! - `contracts`: print every admitted work key
//! - `journal`: print every finalized work key
//! - `probe`: fetch one sample for an identifier from the configured providers
//! - `parse`: parse a reference metric string
//! - `check`: validate the configuration and print the rule fingerprint
//!
//! Logs go to stderr; stdout carries only command output.

mod ingest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dipwatch_core::{parse_metric, DecisionEngine, MetricSource, SystemClock};
use dipwatch_runner::{AppConfig, Dispatcher, FileSet, NotificationQueue, WorkSet};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "dipwatch.toml";

#[derive(Parser)]
#[command(name = "dipwatch", about = "dipwatch: dip-and-rebound watcher for called contracts")]
struct Cli {
    /// TOML config file. Defaults to ./dipwatch.toml if present, else built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Admit identifiers from JSON lines on stdin and watch them.
    Watch {
        #[command(flatten)]
        storage: StorageArgs,

        /// Worker pool size.
        #[arg(long)]
        workers: Option<usize>,

        /// Cancel in-flight runs at end of input instead of waiting for them.
        #[arg(long, default_value_t = false)]
        cancel_on_eof: bool,

        /// Do not resume admitted keys left unfinished by a previous process.
        #[arg(long, default_value_t = false)]
        no_resume: bool,
    },
    /// Print the admitted set as a JSON array of [identifier, reference] pairs.
    Contracts {
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Print the journal of finalized keys as a JSON array of [identifier, reference] pairs.
    Journal {
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Fetch one sample for an identifier and print it.
    Probe {
        identifier: String,
    },
    /// Parse a reference metric string such as "$12.3K".
    Parse {
        text: String,
    },
    /// Validate the configuration and print the rules with their fingerprint.
    Check,
}

#[derive(clap::Args)]
struct StorageArgs {
    /// Admitted-set file (overrides config).
    #[arg(long)]
    admitted: Option<PathBuf>,

    /// Journal file (overrides config).
    #[arg(long)]
    journal: Option<PathBuf>,
}

impl StorageArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.admitted {
            config.storage.admitted_path = path.clone();
        }
        if let Some(path) = &self.journal {
            config.storage.journal_path = path.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Watch {
            storage,
            workers,
            cancel_on_eof,
            no_resume,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            storage.apply(&mut config);
            if let Some(workers) = workers {
                config.pool.workers = workers;
            }
            config.validate()?;
            run_watch(&config, cancel_on_eof, !no_resume)
        }
        Commands::Contracts { storage } => {
            let mut config = load_config(cli.config.as_deref())?;
            storage.apply(&mut config);
            print_set(&config.storage.admitted_path)
        }
        Commands::Journal { storage } => {
            let mut config = load_config(cli.config.as_deref())?;
            storage.apply(&mut config);
            print_set(&config.storage.journal_path)
        }
        Commands::Probe { identifier } => {
            let config = load_config(cli.config.as_deref())?;
            run_probe(&config, &identifier)
        }
        Commands::Parse { text } => {
            let value = parse_metric(&text).with_context(|| format!("cannot parse {text:?}"))?;
            println!("{value}");
            Ok(())
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref())?;
            println!("rules: {} ({})", config.rules.name, config.rules.fingerprint());
            println!("{}", serde_json::to_string_pretty(&config.rules)?);
            println!(
                "sources: {}",
                config.sources.iter().map(|s| s.tag.as_str()).collect::<Vec<_>>().join(" > ")
            );
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "dipwatch=debug,dipwatch_core=debug,dipwatch_runner=debug"
    } else {
        "dipwatch=info,dipwatch_core=info,dipwatch_runner=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            AppConfig::load(Path::new(DEFAULT_CONFIG)).with_context(|| format!("loading {DEFAULT_CONFIG}"))
        }
        None => {
            tracing::debug!("no config file, using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn run_watch(config: &AppConfig, cancel_on_eof: bool, resume: bool) -> Result<()> {
    let admitted = Arc::new(FileSet::open(&config.storage.admitted_path)?);
    let journal = Arc::new(FileSet::open(&config.storage.journal_path)?);

    let source: Arc<dyn MetricSource> = Arc::new(config.build_source()?);
    let engine = Arc::new(DecisionEngine::new(
        source,
        config.rules.clone(),
        config.effective_cadence(),
        Arc::new(SystemClock),
    ));
    let queue = Arc::new(NotificationQueue::connect(
        config.build_notifier()?,
        config.notify.min_delay(),
    )?);
    let dispatcher = Dispatcher::new(engine, admitted, journal, queue.clone(), config.dispatcher_config())?;

    if resume {
        dispatcher.resume_pending();
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match ingest::parse_request(&line) {
            Ok((identifier, reference)) => {
                ingest::admission_response(&dispatcher.admit(&identifier, &reference))
            }
            Err(reason) => ingest::bad_request(&reason),
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    if cancel_on_eof {
        dispatcher.shutdown();
    } else {
        tracing::info!(active = dispatcher.active(), "end of input, waiting for runs");
        dispatcher.wait_idle();
    }
    queue.disconnect();

    tracing::info!(stats = ?dispatcher.stats(), notifications = ?queue.stats(), "watch finished");
    Ok(())
}

fn print_set(path: &Path) -> Result<()> {
    let set = FileSet::open(path)?;
    println!("{}", serde_json::to_string(&set.snapshot())?);
    Ok(())
}

fn run_probe(config: &AppConfig, identifier: &str) -> Result<()> {
    let source = config.build_source()?;
    let sample = source
        .fetch(identifier.trim())
        .with_context(|| format!("no provider answered for {identifier}"))?;
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}
