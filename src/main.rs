//! Trellis-Crawl command-line interface
//!
//! Loads the pipeline definitions, opens the shared store, and exposes the
//! crawler lifecycle operations as subcommands.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trellis_crawl::config::load_pipeline;
use trellis_crawl::storage::{
    CrawlStore, MemoryStore, SharedCrawlStore, SharedJobStore, SqliteStore,
};
use trellis_crawl::worker::Worker;
use trellis_crawl::{Crawler, Manager, Registry, Settings};
use tracing_subscriber::EnvFilter;

/// Trellis-Crawl: a declarative multi-stage crawl pipeline scheduler
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version)]
#[command(about = "Schedule and run declarative crawl pipelines", long_about = None)]
struct Cli {
    /// Path to the operator settings TOML file
    #[arg(long, value_name = "FILE", env = "TRELLIS_SETTINGS")]
    settings: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available crawlers
    List,

    /// Queue the execution of a crawler
    Run {
        /// Crawler name
        crawler: String,

        /// Use a fixed run identifier instead of a generated one
        #[arg(long)]
        run_id: Option<String>,

        /// Re-process URLs seen in earlier runs
        #[arg(long, conflicts_with = "incremental")]
        non_incremental: bool,

        /// Skip URLs seen in earlier runs
        #[arg(long)]
        incremental: bool,
    },

    /// Run a single pipeline file against an in-memory store and drain it
    FileRun {
        /// Path to the pipeline YAML file
        config_file: PathBuf,

        /// Flush the crawler's state before running
        #[arg(long)]
        flush: bool,
    },

    /// Abort execution of a crawler
    Cancel { crawler: String },

    /// Delete all data generated by a crawler
    Flush { crawler: String },

    /// Delete all tags generated by a crawler
    FlushTags { crawler: String },

    /// Start the worker and process tasks as they come; blocks
    Process,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let settings = Settings::load(cli.settings.as_deref()).context("loading settings")?;

    match cli.command {
        Command::FileRun { config_file, flush } => handle_file_run(&config_file, flush).await,
        command => {
            let store = Arc::new(
                SqliteStore::new(Path::new(&settings.database_path))
                    .with_context(|| format!("opening store at {}", settings.database_path))?,
            );
            let jobs: SharedJobStore = store.clone();
            let crawls: SharedCrawlStore = store;
            let registry = Arc::new(Registry::builtin(crawls.clone()));
            let manager = Arc::new(Manager::load_dir(
                Path::new(&settings.config_dir),
                &registry,
                jobs.clone(),
                crawls.clone(),
                &settings,
            )?);

            match command {
                Command::List => handle_list(&manager),
                Command::Run {
                    crawler,
                    run_id,
                    non_incremental,
                    incremental,
                } => {
                    let incremental = if non_incremental {
                        Some(false)
                    } else if incremental {
                        Some(true)
                    } else {
                        None
                    };
                    manager.require(&crawler)?.run(incremental, run_id)?;
                    Ok(())
                }
                Command::Cancel { crawler } => {
                    manager.require(&crawler)?.cancel()?;
                    Ok(())
                }
                Command::Flush { crawler } => {
                    manager.require(&crawler)?.flush()?;
                    Ok(())
                }
                Command::FlushTags { crawler } => {
                    manager.require(&crawler)?.flush_tags()?;
                    Ok(())
                }
                Command::Process => {
                    let worker = Worker::new(manager, registry, jobs, crawls, &settings);
                    worker.run().await?;
                    Ok(())
                }
                Command::FileRun { .. } => unreachable!("handled above"),
            }
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trellis_crawl=info,warn"),
            1 => EnvFilter::new("trellis_crawl=debug,info"),
            2 => EnvFilter::new("trellis_crawl=trace,debug"),
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

/// Prints a table of all loaded crawlers with due/pending state
fn handle_list(manager: &Manager) -> anyhow::Result<()> {
    println!(
        "{:<24} {:<36} {:<10} {:<5} {:>8}",
        "Name", "Description", "Schedule", "Due", "Pending"
    );
    for crawler in manager.iter() {
        let due = if crawler.check_due()? { "yes" } else { "no" };
        println!(
            "{:<24} {:<36} {:<10} {:<5} {:>8}",
            crawler.name,
            crawler.description,
            crawler.schedule,
            due,
            crawler.pending()?
        );
    }
    Ok(())
}

/// Runs one pipeline file to completion against an in-memory store
async fn handle_file_run(config_file: &Path, flush: bool) -> anyhow::Result<()> {
    let settings = Settings::default();
    let store = Arc::new(MemoryStore::new());
    let jobs: SharedJobStore = store.clone();
    let crawls: SharedCrawlStore = store;
    let registry = Arc::new(Registry::builtin(crawls.clone()));

    let config = load_pipeline(config_file)
        .with_context(|| format!("loading {}", config_file.display()))?;
    let crawler = Crawler::new(config, &registry, jobs.clone(), crawls.clone(), &settings)?;
    let name = crawler.name.clone();

    let mut manager = Manager::new();
    manager.add(crawler)?;
    let manager = Arc::new(manager);

    let crawler = manager.require(&name)?;
    if flush {
        crawler.flush()?;
    }
    crawler.run(None, None)?;

    let worker = Worker::new(
        manager.clone(),
        registry,
        jobs,
        crawls.clone(),
        &settings,
    );
    worker.sync().await?;

    let crawler = manager.require(&name)?;
    println!(
        "Run complete: {} operation(s), {} event(s)",
        crawler.op_count()?,
        crawls.events(&name)?.len()
    );
    Ok(())
}
