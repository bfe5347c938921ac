// src/main.rs

//! watchdog: Hacker News thread watcher CLI
//!
//! The `run` command hosts the long-lived scanner and dispatcher loops;
//! the remaining commands are one-shot operations against the same store.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use watchdog::config::Config;
use watchdog::error::{AppError, Result};
use watchdog::models::User;
use watchdog::now_ms;
use watchdog::pipeline::{
    create_scan_task, dispatch_pending_alerts, run_scan_cycle, watchlist,
};
use watchdog::ratelimit::{RateLimiter, ACTION_UNWATCH_ALL, ACTION_UPDATE};
use watchdog::render;
use watchdog::services::{parse_item_id, DocumentSource, HackerNewsClient, TelegramNotifier};
use watchdog::storage::{Store, UnwatchOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "watchdog",
    version,
    about = "Hacker News thread watcher and alert bot"
)]

/// CLI Arguments
struct Cli {
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

/// CLI Commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scanner and dispatcher loops
    Run,
    /// Create and drive one scan cycle, then exit
    Scan,
    /// Deliver one batch of pending alerts, then exit
    Dispatch,
    /// Watch an item (id, item URL, or "watch <id>" text)
    Watch {
        target: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        username: String,
    },
    /// Stop watching an item
    Unwatch {
        target: String,
        #[arg(long)]
        user: String,
    },
    /// Clear the whole watch list (rate limited)
    Unwatchall {
        #[arg(long)]
        user: String,
    },
    /// Force every watched item due now (rate limited)
    Update {
        #[arg(long)]
        user: String,
    },
    /// Show the watch list
    List {
        #[arg(long)]
        user: String,
    },
    /// Show record counts
    Stats,
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    config.validate()?;

    if let Command::Validate = cli.command {
        println!("configuration ok");
        return Ok(());
    }

    let store = Store::open(&config.storage.db_path).await?;

    match cli.command {
        Command::Run => run_daemon(&store, &config).await?,
        Command::Scan => {
            let source = HackerNewsClient::new(&config.hackernews)?;
            create_scan_task(&store, &config).await?;
            let report = run_scan_cycle(&store, &source, &config).await?;
            println!("scanned {} item(s)", report.items_processed);
        }
        Command::Dispatch => {
            let notifier = TelegramNotifier::new(&config.telegram)?;
            let report =
                dispatch_pending_alerts(&store, &notifier, config.alert.batch_size).await?;
            println!(
                "dispatched {} alert(s), {} failed",
                report.attempted, report.failed
            );
        }
        Command::Watch {
            target,
            user,
            name,
            username,
        } => {
            let doc_id = parse_item_id(&target)
                .ok_or_else(|| AppError::validation(format!("not an item id: {target:?}")))?;
            let source = HackerNewsClient::new(&config.hackernews)?;
            let doc = source.fetch(doc_id).await?;
            let item = watchlist::watch(&store, &config, &cli_user(&user, &name, &username), &doc)
                .await?;
            println!("{}", render::view_text(&item.doc, None));
        }
        Command::Unwatch { target, user } => {
            let doc_id = parse_item_id(&target)
                .ok_or_else(|| AppError::validation(format!("not an item id: {target:?}")))?;
            let outcome =
                watchlist::unwatch(&store, &cli_user(&user, "", ""), doc_id).await?;
            match outcome {
                UnwatchOutcome::Removed { .. } => println!("stopped watching {doc_id}"),
                UnwatchOutcome::NotWatching => println!("not watching {doc_id}"),
            }
        }
        Command::Unwatchall { user } => {
            let limiter = RateLimiter::new(store.clone(), config.limits.clone());
            if let Some(wait_ms) = limiter.try_acquire(&user, ACTION_UNWATCH_ALL, now_ms()).await? {
                println!("rate limited, try again in up to {}s", wait_ms / 1000);
                return Ok(());
            }
            let removed = watchlist::unwatch_all(&store, &cli_user(&user, "", "")).await?;
            println!("removed {removed} watch(es)");
        }
        Command::Update { user } => {
            let limiter = RateLimiter::new(store.clone(), config.limits.clone());
            if let Some(wait_ms) = limiter.try_acquire(&user, ACTION_UPDATE, now_ms()).await? {
                println!("rate limited, try again in up to {}s", wait_ms / 1000);
                return Ok(());
            }
            let rescheduled = watchlist::refresh(&store, &user).await?;
            println!("{rescheduled} item(s) due on the next scan");
        }
        Command::List { user } => {
            let items = watchlist::list(&store, &user).await?;
            if items.is_empty() {
                println!("watch list is empty");
            }
            for (idx, item) in items.iter().enumerate() {
                println!("{}\n", render::view_text(&item.doc, Some(idx + 1)));
            }
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("users:            {}", stats.users);
            println!("items:            {}", stats.items);
            println!("  scheduled:      {}", stats.scheduled_items);
            println!("watches:          {}", stats.watches);
            println!("alerts pending:   {}", stats.alerts_pending);
            println!("alerts delivered: {}", stats.alerts_delivered);
            println!("scan tasks:       {}", stats.scan_tasks);
        }
        Command::Validate => unreachable!("handled before the store opens"),
    }

    Ok(())
}

fn cli_user(id: &str, name: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        display_name: if name.is_empty() {
            id.to_string()
        } else {
            name.to_string()
        },
        username: username.to_string(),
    }
}

/// Long-running mode: a scan tick creates (or resumes) the single active
/// scan task and drives it to completion; a dispatch tick delivers one
/// batch of pending alerts. Tick failures are logged and the loop goes on.
async fn run_daemon(store: &Store, config: &Config) -> Result<()> {
    let source = HackerNewsClient::new(&config.hackernews)?;
    let notifier = TelegramNotifier::new(&config.telegram)?;

    let mut scan_tick =
        tokio::time::interval(std::time::Duration::from_secs(config.poller.scan_interval_secs));
    let mut dispatch_tick = tokio::time::interval(std::time::Duration::from_secs(
        config.alert.dispatch_interval_secs,
    ));

    info!(
        scan_interval = config.poller.scan_interval_secs,
        dispatch_interval = config.alert.dispatch_interval_secs,
        "watchdog started"
    );

    loop {
        tokio::select! {
            _ = scan_tick.tick() => {
                if let Err(e) = scan_once(store, &source, config).await {
                    error!(error = %e, "scan cycle failed");
                }
            }
            _ = dispatch_tick.tick() => {
                if let Err(e) =
                    dispatch_pending_alerts(store, &notifier, config.alert.batch_size).await
                {
                    error!(error = %e, "alert dispatch failed");
                }
            }
        }
    }
}

async fn scan_once(store: &Store, source: &dyn DocumentSource, config: &Config) -> Result<()> {
    create_scan_task(store, config).await?;
    let report = run_scan_cycle(store, source, config).await?;
    if report.items_processed > 0 {
        info!(items = report.items_processed, "scan cycle complete");
    }
    Ok(())
}
