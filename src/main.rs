use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use closure_tracker::{
    annotate, read_feed_file, render_text, write_periods_csv, Config, FeedProcessor,
    HistoryStore, NameDirectory, RawItem,
};

#[derive(Parser)]
#[command(
    name = "closure-tracker",
    version,
    about = "Tracks restriction notices per location and reconstructs closure periods"
)]
struct Cli {
    /// JSON config file (all fields optional)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// History store file, overrides the config
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process saved feed files (JSON or Atom/RSS) into the store
    Run {
        /// Feed files; unreadable ones are skipped
        feeds: Vec<PathBuf>,
    },
    /// Print every location with its closure periods
    Report {
        /// Annotated JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write all closure periods as CSV ("-" for stdout)
    ExportCsv { out: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    match cli.command {
        Command::Run { feeds } => run_feeds(&config, &feeds),
        Command::Report { json } => run_report(&config, json),
        Command::ExportCsv { out } => run_export(&config, &out),
    }
}

fn load_store(config: &Config) -> Result<HistoryStore> {
    Ok(HistoryStore::load(&config.store_path)?
        .with_duplicate_policy(config.duplicate_events)
        .with_log_order(config.ordering))
}

fn run_feeds(config: &Config, feeds: &[PathBuf]) -> Result<()> {
    let mut store = load_store(config)?;

    let mut directory = NameDirectory::seeded(config.min_stem_len);
    if let Some(seed_path) = &config.seed_path {
        let added = directory.extend_from_file(seed_path)?;
        info!(seed = %seed_path.display(), added, "seed file merged");
    }

    let mut items: Vec<RawItem> = Vec::new();
    for feed in feeds {
        match read_feed_file(feed) {
            Ok(feed_items) => {
                info!(feed = %feed.display(), items = feed_items.len(), "feed read");
                items.extend(feed_items);
            }
            Err(e) => warn!(feed = %feed.display(), error = %format!("{:#}", e), "feed skipped"),
        }
    }

    let processor = FeedProcessor::new(config)?;
    let report = processor.process(&mut store, &mut directory, &items);

    // The store is the only copy of history: failing here is fatal
    store
        .save(&config.store_path)
        .context("Run not persisted")?;

    println!("✓ {}", report.summary());
    print!("{}", render_text(&annotate(&store, Utc::now())));
    Ok(())
}

fn run_report(config: &Config, json: bool) -> Result<()> {
    let store = load_store(config)?;
    let views = annotate(&store, Utc::now());

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&views).context("Failed to serialize report")?
        );
    } else {
        print!("{}", render_text(&views));
    }
    Ok(())
}

fn run_export(config: &Config, out: &Path) -> Result<()> {
    let store = load_store(config)?;
    let views = annotate(&store, Utc::now());

    if out == Path::new("-") {
        write_periods_csv(&views, io::stdout().lock())
    } else {
        let file = File::create(out)
            .with_context(|| format!("Failed to create CSV file: {}", out.display()))?;
        write_periods_csv(&views, file)?;
        info!(out = %out.display(), "periods exported");
        Ok(())
    }
}
