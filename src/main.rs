use anyhow::Result;
use artcast::config::{Config, ScheduleConfig};
use artcast::dedup::{DedupIndex, HashStore};
use artcast::dispatcher::Dispatcher;
use artcast::feed::JsonFeed;
use artcast::fetcher::Fetcher;
use artcast::filter::BlacklistFilter;
use artcast::publish::DryRunPublisher;
use artcast::scheduler::UpdateScheduler;
use artcast::storage::{CursorStore, ScheduleStore};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "artcast",
    version,
    about = "Scheduled artwork reposting pipeline with dedup and blacklist filtering",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch loop
    Run,

    /// Pull the feed once and schedule new posts, without dispatching
    Pull,

    /// Print a summary of the pending schedule
    Status {
        /// Number of upcoming entries to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => {
            tracing::info!("Starting run command");
            run(config).await?;
        }
        Commands::Pull => {
            tracing::info!("Starting pull command");
            pull(config).await?;
        }
        Commands::Status { limit } => {
            status(config, limit)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("artcast=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("artcast=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Wire the pipeline together from config and durable state
fn build_dispatcher(config: &Config) -> Result<(Dispatcher, ScheduleConfig)> {
    config.paths.ensure_data_dir()?;

    let schedule_config = ScheduleConfig::from_json_file(&config.paths.scheduler_file())?;
    let filter = BlacklistFilter::from_json_file(&config.paths.blacklist_file())?;

    let fetcher = Arc::new(Fetcher::new(&config.transport)?);
    let dedup = DedupIndex::new(
        HashStore::open(&config.paths.hash_db())?,
        fetcher,
        config.media.allowed_formats.clone(),
    );

    let now = Local::now().naive_local();
    let update_scheduler = UpdateScheduler::from_strings(&schedule_config.update_times, now)?;

    let dispatcher = Dispatcher::new(
        Box::new(JsonFeed::new(config.paths.inbox_file())),
        Box::new(DryRunPublisher::new()),
        filter,
        dedup,
        update_scheduler,
        ScheduleStore::new(config.paths.schedule_file()),
        CursorStore::new(config.paths.cursor_file()),
        schedule_config.check_interval(),
    )?;

    Ok((dispatcher, schedule_config))
}

async fn run(config: Config) -> Result<()> {
    let (mut dispatcher, schedule_config) = build_dispatcher(&config)?;
    tracing::info!(
        triggers = ?schedule_config.update_times,
        interval_secs = schedule_config.check_interval_secs,
        pending = dispatcher.pending(),
        "Pipeline assembled"
    );

    let run_flag = dispatcher.run_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            run_flag.store(false, Ordering::Relaxed);
        }
    });

    dispatcher.run().await?;
    Ok(())
}

async fn pull(config: Config) -> Result<()> {
    let (mut dispatcher, _) = build_dispatcher(&config)?;

    let scheduled = dispatcher.pull_once().await?;
    println!("Scheduled {scheduled} new posts ({} pending total)", dispatcher.pending());
    Ok(())
}

fn status(config: Config, limit: usize) -> Result<()> {
    let schedule = ScheduleStore::new(config.paths.schedule_file()).load()?;
    let cursor = CursorStore::new(config.paths.cursor_file()).load()?;

    println!("Pending posts:  {}", schedule.len());
    println!("Feed cursor:    {}", cursor.last_post_id);

    let mut upcoming: Vec<_> = schedule.iter().collect();
    upcoming.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    for entry in upcoming.iter().take(limit) {
        println!("  {}  {}", entry.timestamp.format("%Y-%m-%d %H:%M"), entry.post);
    }
    if schedule.len() > limit {
        println!("  ... and {} more", schedule.len() - limit);
    }
    Ok(())
}
