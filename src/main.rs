mod cache;
mod config;
mod event;
mod host;
mod manifest;
mod net;
mod notify;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;
use url::Url;

use cache::{CacheStorage, Destination, FetchReply, FetchSource, MemoryStorage, Request, SqliteStorage};
use config::Config;
use event::WorkerEvent;
use host::LogHost;
use net::HttpFetcher;
use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "breath-worker")]
#[command(about = "Offline cache and push notification worker for the Breath Trainer app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/breath-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin the app is served from (overrides the config file)
  #[arg(long)]
  origin: Option<String>,

  /// Cache database path (overrides the config file)
  #[arg(long)]
  cache_db: Option<PathBuf>,

  /// Run against an empty in-memory cache instead of the database
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the asset manifest into the current cache generation
  Install,
  /// Evict every cache generation except the current one
  Activate,
  /// Run one request through the fetch interceptor
  Fetch {
    /// Absolute URL to request
    url: String,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,

    /// Request destination (only documents get the offline fallback)
    #[arg(long, value_enum, default_value_t = Destination::Other)]
    destination: Destination,
  },
  /// Deliver a background sync event
  Sync {
    /// Sync tag
    #[arg(long, default_value = manifest::SYNC_TAG)]
    tag: String,
  },
  /// Deliver a push event (displays the exercise reminder)
  Push,
  /// Deliver a notification click
  NotificationClick {
    /// Action id that was clicked, if any
    #[arg(long)]
    action: Option<String>,
  },
}

fn send(tx: &mpsc::UnboundedSender<WorkerEvent>, event: WorkerEvent) -> Result<()> {
  tx.send(event).map_err(|_| eyre!("event queue closed"))
}

/// Deliver one lifecycle event to a fresh worker and run it to completion.
async fn drive<S: CacheStorage>(config: Config, storage: Arc<S>, command: Command) -> Result<()> {
  let fetcher = HttpFetcher::new(config.origin_url()?)?;
  let worker = Worker::new(config, storage, fetcher, LogHost)?;

  let (tx, queue) = event::channel();

  // Translate the subcommand into its lifecycle event. For fetches, keep
  // the reply end so the outcome can be reported once the queue drains.
  let mut fetch_reply = None;
  match command {
    Command::Install => send(&tx, WorkerEvent::Install)?,
    Command::Activate => send(&tx, WorkerEvent::Activate)?,
    Command::Fetch {
      url,
      method,
      destination,
    } => {
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
      let (reply_tx, reply_rx) = oneshot::channel();
      send(
        &tx,
        WorkerEvent::Fetch {
          request: Request::new(&method, url, destination),
          reply: reply_tx,
        },
      )?;
      fetch_reply = Some(reply_rx);
    }
    Command::Sync { tag } => send(&tx, WorkerEvent::Sync { tag })?,
    Command::Push => send(&tx, WorkerEvent::Push)?,
    Command::NotificationClick { action } => {
      send(&tx, WorkerEvent::NotificationClick { action })?
    }
  }

  // Close the queue so the worker loop ends after this one event
  drop(tx);
  worker.run(queue).await;

  if let Some(reply_rx) = fetch_reply {
    match reply_rx.await {
      Ok(FetchReply::Response { response, source }) => {
        let source = match source {
          FetchSource::Cache => "cache",
          FetchSource::Network => "network",
          FetchSource::OfflineFallback => "offline fallback",
        };
        println!(
          "HTTP {} via {} ({} bytes)",
          response.status,
          source,
          response.body.len()
        );
      }
      Ok(FetchReply::Bypass) => {
        println!("bypass: denylisted URL, request passes through uncached");
      }
      Ok(FetchReply::NoResponse) => {
        println!("offline: no response and no fallback available");
      }
      Err(_) => {
        return Err(eyre!("fetch handler failed; see log for details"));
      }
    }
  }

  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  // Load configuration, then apply command-line overrides
  let config = Config::load(args.config.as_deref())?;
  let config = Config {
    origin: args.origin.unwrap_or(config.origin),
    cache_db: args.cache_db.or(config.cache_db),
  };

  if args.ephemeral {
    drive(config, Arc::new(MemoryStorage::new()), args.command).await
  } else {
    let storage = SqliteStorage::open(config.cache_db.as_deref())?;
    drive(config, Arc::new(storage), args.command).await
  }
}
