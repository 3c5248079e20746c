use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use adwatch::cli::{Cli, Commands};
use adwatch::config::Config;
use adwatch::domain::{ListingItem, Notification};
use adwatch::services::{
    split_target, CommandService, CycleCallbacks, CycleEvent, NotificationService, SubscriberId,
    WatchService, WatchSettings,
};
use adwatch::sources::{ApiSource, ListingSource};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("adwatch=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { chat, dry_run } => {
            let config = Config::from_env(!dry_run)?;
            cmd_run(&config, chat, dry_run).await
        }
        Commands::Check { url } => {
            let config = Config::from_env(false)?;
            cmd_check(&config, &url).await
        }
    }
}

async fn cmd_run(config: &Config, chat: SubscriberId, dry_run: bool) -> Result<()> {
    let source = Arc::new(ApiSource::from_config(config)?);
    let (callbacks, mut events) = CycleCallbacks::channel();
    let watch = Arc::new(WatchService::new(
        source,
        WatchSettings::from(config),
        callbacks,
    ));
    let commands = CommandService::new(watch.clone());

    let notifier = match (&config.notebrook, dry_run) {
        (Some(notebrook), false) => Some(NotificationService::new(notebrook)?),
        _ => None,
    };

    if dry_run {
        println!("Dry run: new listings are printed, not sent.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let (id, text) = split_target(&line, chat);
                if text.is_empty() {
                    continue;
                }
                let reply = commands.handle_line(id, text).await;
                println!("[{}] {}", id, reply);
            }
            Some(event) = events.recv() => {
                deliver(event, notifier.as_ref()).await;
            }
        }
    }

    watch.shutdown().await;

    // results of ticks that finished while shutting down
    while let Ok(event) = events.try_recv() {
        deliver(event, notifier.as_ref()).await;
    }

    Ok(())
}

async fn deliver(event: CycleEvent, notifier: Option<&NotificationService>) {
    match event {
        CycleEvent::NewItems(id, items) => {
            let notifications: Vec<Notification> =
                items.iter().map(Notification::from_listing).collect();

            match notifier {
                Some(service) => {
                    let errors = service.send_all(id, &notifications).await;
                    tracing::info!(
                        subscriber = id,
                        sent = notifications.len() - errors.len(),
                        failed = errors.len(),
                        "Delivered new listings"
                    );
                    for e in errors {
                        tracing::error!(subscriber = id, "Notification failed: {}", e);
                    }
                }
                None => {
                    for notification in &notifications {
                        println!("[{}] [DRY RUN] {}", id, notification.format());
                    }
                }
            }
        }
        CycleEvent::Failed(id, error) => {
            println!("[{}] fetch failed: {}", id, error);
        }
    }
}

async fn cmd_check(config: &Config, url: &str) -> Result<()> {
    let source = ApiSource::from_config(config)?;

    println!("Fetching {}...\n", url);

    let items: Vec<ListingItem> = source
        .fetch(url)
        .await?
        .into_iter()
        .map(ListingItem::from_raw)
        .collect();

    if items.is_empty() {
        println!("No listings found.");
        return Ok(());
    }

    for item in &items {
        println!("{}\n", item);
    }
    println!("{} listings.", items.len());

    Ok(())
}
