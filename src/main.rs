//! debugscope Binary Entry Point
//!
//! Feeds `LEVEL TAG message` lines from stdin into a fresh debug store and prints
//! the filtered result as JSON lines. Core functionality is provided by the
//! `debugscope` library crate.

use std::io::{BufRead, Write};
use std::str::FromStr;

use clap::Parser;
use debugscope::{
    DebugStore, LogLevel, LogQuery, LogRecord,
    config::AppConfig,
    storage::{DEFAULT_LIMIT, MAX_LIMIT},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// debugscope - In-process diagnostic event store
#[derive(Parser, Debug)]
#[command(name = "debugscope", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "DEBUGSCOPE_CONFIG")]
    config: Option<String>,

    /// Database file path (overrides config file)
    #[arg(long, env = "DEBUGSCOPE_DB_PATH")]
    db_path: Option<String>,

    /// Only print lines with this level
    #[arg(long)]
    level: Option<String>,

    /// Only print lines with this exact tag
    #[arg(long)]
    tag: Option<String>,

    /// Only print lines whose message or tag contains this text
    #[arg(long)]
    search: Option<String>,

    /// Maximum number of lines to print
    #[arg(long, default_value_t = DEFAULT_LIMIT, value_parser = clap::value_parser!(u32).range(1..=MAX_LIMIT as i64))]
    limit: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(path) = cli.db_path.clone() {
        config.database.path = path;
    }
    config.validate()?;

    // Initialize tracing (RUST_LOG > config file > default)
    let default_filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| "info,debugscope=debug".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        path = %config.database.resolved_path(),
        pool_size = config.database.pool_size,
        shutdown_mode = %config.database.shutdown_mode,
        "debugscope starting"
    );

    let store = DebugStore::new(config.database);
    store.init()?;

    let result = run(&store, &cli);

    if let Err(e) = store.destroy() {
        tracing::error!(error = %e, "Failed to shut down store");
    }
    result
}

fn run(store: &DebugStore, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut ingested = 0usize;
    let mut skipped = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(record) => {
                store.add_log(record)?;
                ingested += 1;
            }
            None => {
                tracing::warn!(line = %line, "Skipping line without a known level");
                skipped += 1;
            }
        }
    }

    store.sync()?;
    tracing::info!(ingested, skipped, "Input ingested");

    let mut query = LogQuery::page(0, cli.limit);
    if let Some(level) = &cli.level {
        query = query.level(level);
    }
    if let Some(tag) = &cli.tag {
        query = query.tag(tag);
    }
    if let Some(search) = &cli.search {
        query = query.search(search);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in store.query_logs(&query)? {
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
    }
    out.flush()?;

    Ok(())
}

/// Parse `LEVEL TAG message`; the message may be empty.
fn parse_line(line: &str) -> Option<LogRecord> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let level = LogLevel::from_str(parts.next()?).ok()?;
    let tag = parts.next()?;
    let message = parts.next().unwrap_or("").trim_start();
    Some(LogRecord::new(level, tag, message))
}
