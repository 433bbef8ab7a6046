//! Register-Crawl main entry point
//!
//! This is the command-line interface for the classification register crawler.

use anyhow::Context;
use chrono::Datelike;
use clap::Parser;
use register_crawl::config::{load_config_with_hash, Config};
use register_crawl::crawler::{CursorPosition, DateWindows, RecordStream};
use register_crawl::output::{load_statistics, print_statistics};
use register_crawl::storage::{open_store, RecordStore, RunStatus};
use register_crawl::CrawlError;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Register-Crawl: a classification register harvester
///
/// Register-Crawl walks the classification register in half-month windows,
/// enriches every listed decision from its detail page and stores the
/// records in SQLite. Interrupted crawls resume from the last stored date.
#[derive(Parser, Debug)]
#[command(name = "register-crawl")]
#[command(version)]
#[command(about = "A classification register harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Continue after the last stored record (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Crawl the whole configured range, ignoring stored records
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Override the configured first year
    #[arg(long, value_name = "YEAR")]
    start_year: Option<i32>,

    /// Override the configured end year (exclusive)
    #[arg(long, value_name = "YEAR")]
    finish_year: Option<i32>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(year) = cli.start_year {
        config.crawler.start_year = year;
    }
    if let Some(year) = cli.finish_year {
        config.crawler.finish_year = year;
    }
    if cli.start_year.is_some() || cli.finish_year.is_some() {
        register_crawl::config::validate(&config).context("Invalid year override")?;
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(&config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("register_crawl=info,warn"),
            1 => EnvFilter::new("register_crawl=debug,info"),
            2 => EnvFilter::new("register_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Register-Crawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Years: {} to {} (exclusive)",
        config.crawler.start_year, config.crawler.finish_year
    );
    println!(
        "  On encoding error: {:?}",
        config.crawler.on_encoding_error
    );

    println!("\nConnection:");
    println!("  Base URL: {}", config.connection.base_url);
    println!("  Read timeout: {}ms", config.connection.read_timeout_ms);
    println!("  Connect timeout: {}ms", config.connection.connect_timeout_ms);
    match config.connection.max_attempts {
        Some(max) => println!("  Max attempts: {}", max),
        None => println!("  Max attempts: unlimited"),
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let windows = DateWindows::new(config.crawler.start_year, config.crawler.finish_year).count();
    println!("\n✓ Configuration is valid");
    println!("✓ Would query {} date windows", windows);
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_store(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

#[derive(Debug, Default)]
struct CrawlTotals {
    stored: u64,
    already_stored: u64,
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let mut store = open_store(Path::new(&config.output.database_path))?;
    let run_id = store.create_run(config_hash)?;
    tracing::info!("Starting crawl run {}", run_id);

    let mut stream = RecordStream::new(config)?;

    if fresh {
        tracing::info!("Starting fresh crawl (ignoring stored records)");
    } else if let Some(date) = store.last_classification_date()? {
        if date.year() >= config.crawler.start_year {
            tracing::info!("Last stored record is from {}", date);
            stream.resume_at(CursorPosition::preceding(date));
        }
    }

    let start_time = std::time::Instant::now();
    let mut totals = CrawlTotals::default();

    let outcome = tokio::select! {
        result = store_records(&mut stream, &mut store, run_id, &mut totals, start_time) => {
            result.map(|()| RunStatus::Completed)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            Ok(RunStatus::Interrupted)
        }
    };

    let stats = stream.stats();
    tracing::info!(
        "{} records stored, {} already stored, {} skipped, {} windows ({} via rating fallback), {} reconnects",
        totals.stored,
        totals.already_stored,
        stats.skipped,
        stats.windows,
        stats.fallback_windows,
        stream.reconnects()
    );

    match outcome {
        Ok(status) => {
            if status == RunStatus::Interrupted {
                log_checkpoint(&stream);
            }
            store.finish_run(run_id, status)?;
            tracing::info!("Crawl run {} {}", run_id, status.to_db_string());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            log_checkpoint(&stream);
            store.finish_run(run_id, RunStatus::Failed)?;
            Err(e.into())
        }
    }
}

/// Pulls records from the stream into the store until the stream ends
async fn store_records(
    stream: &mut RecordStream,
    store: &mut dyn RecordStore,
    run_id: i64,
    totals: &mut CrawlTotals,
    start_time: std::time::Instant,
) -> Result<(), CrawlError> {
    while let Some(record) = stream.next().await? {
        if !store.insert_record(&record, run_id)? {
            totals.already_stored += 1;
            continue;
        }
        totals.stored += 1;

        if totals.stored % 100 == 0 {
            let rate = totals.stored as f64 / start_time.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} records stored, window {}, {:.2} records/sec",
                totals.stored,
                stream
                    .current_window()
                    .map(|w| w.to_string())
                    .unwrap_or_default(),
                rate
            );
        }
    }
    Ok(())
}

fn log_checkpoint(stream: &RecordStream) {
    if let Some(position) = stream.checkpoint() {
        tracing::info!(
            "Resume checkpoint: {} (year {}, month {}, day {})",
            position,
            position.year,
            position.month,
            position.day
        );
    }
}
