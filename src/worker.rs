//! The worker itself: one handler per lifecycle event, dispatched off the
//! event queue one at a time.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheFirst, CacheStorage, FetchReply, Request};
use crate::config::Config;
use crate::event::{EventQueue, WorkerEvent};
use crate::host::WorkerHost;
use crate::manifest;
use crate::net::Fetcher;
use crate::notify;

/// Offline cache and notification worker.
pub struct Worker<S: CacheStorage, F: Fetcher, H: WorkerHost> {
  config: Config,
  storage: Arc<S>,
  interceptor: CacheFirst<S>,
  fetcher: F,
  host: H,
}

impl<S: CacheStorage, F: Fetcher, H: WorkerHost> Worker<S, F, H> {
  pub fn new(config: Config, storage: Arc<S>, fetcher: F, host: H) -> Result<Self> {
    let origin = config.origin_url()?;
    let interceptor = CacheFirst::new(Arc::clone(&storage), manifest::CACHE_NAME, &origin)?
      .with_bypass(manifest::BYPASS_HOSTS);

    Ok(Self {
      config,
      storage,
      interceptor,
      fetcher,
      host,
    })
  }

  /// Run until the event queue closes.
  ///
  /// Each handler runs to completion before the next event is taken. A
  /// handler error is reported and the loop keeps going; nothing here can
  /// take the worker down.
  pub async fn run(&self, mut events: EventQueue) {
    while let Some(event) = events.next().await {
      if let Err(err) = self.handle_event(event).await {
        error!("unhandled event error: {err:#}");
      }
    }
  }

  async fn handle_event(&self, event: WorkerEvent) -> Result<()> {
    match event {
      WorkerEvent::Install => self.on_install().await,
      WorkerEvent::Activate => self.on_activate().await,
      WorkerEvent::Fetch { request, reply } => {
        let outcome = self.on_fetch(&request).await?;
        // Receiver may be gone if the requesting page was torn down
        let _ = reply.send(outcome);
        Ok(())
      }
      WorkerEvent::Sync { tag } => self.on_sync(&tag).await,
      WorkerEvent::Push => self.on_push().await,
      WorkerEvent::NotificationClick { action } => self.on_notification_click(action.as_deref()),
    }
  }

  /// Install: pre-cache the asset manifest into the current generation.
  ///
  /// Population failure is logged and swallowed; installation still
  /// completes, possibly with a partial cache. No rollback, no retry.
  async fn on_install(&self) -> Result<()> {
    info!(generation = manifest::CACHE_NAME, "installing");
    self.host.skip_waiting();

    if let Err(err) = self.precache().await {
      warn!("cache population failed: {err:#}");
    }

    Ok(())
  }

  async fn precache(&self) -> Result<()> {
    self.storage.open_bucket(manifest::CACHE_NAME)?;

    let requests = manifest::PRECACHE_PATHS
      .iter()
      .map(|path| self.config.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let fetches = requests.iter().map(|request| async move {
      let response = self.fetcher.fetch(request).await?;
      self.storage.put(manifest::CACHE_NAME, request, &response)?;
      Ok::<_, color_eyre::Report>(())
    });
    futures::future::try_join_all(fetches).await?;

    info!(assets = manifest::PRECACHE_PATHS.len(), "cache populated");
    Ok(())
  }

  /// Activate: evict every cache generation except the current one, then
  /// claim the open clients.
  ///
  /// Deletion failures are not caught here; they surface at the event loop
  /// as unhandled (fatal to this event, not to the worker).
  async fn on_activate(&self) -> Result<()> {
    info!(generation = manifest::CACHE_NAME, "activated");

    let stale: Vec<String> = self
      .storage
      .bucket_names()?
      .into_iter()
      .filter(|name| name != manifest::CACHE_NAME)
      .collect();

    let deletions = stale.iter().map(|name| async move {
      info!(bucket = %name, "deleting previous cache generation");
      self.storage.delete_bucket(name).map(|_| ())
    });
    let results = futures::future::join_all(deletions).await;

    // Claim is not gated on the cleanup outcome
    self.host.claim();

    results.into_iter().collect::<Result<Vec<()>>>()?;
    Ok(())
  }

  async fn on_fetch(&self, request: &Request) -> Result<FetchReply> {
    self.interceptor.handle(request, &self.fetcher).await
  }

  /// Sync: run the background task for the known tag.
  async fn on_sync(&self, tag: &str) -> Result<()> {
    if tag != manifest::SYNC_TAG {
      debug!(tag, "ignoring sync event with unknown tag");
      return Ok(());
    }

    info!("background sync started");
    self.background_sync().await;
    info!("background sync complete");
    Ok(())
  }

  /// Extension point: no synchronization work is defined yet.
  async fn background_sync(&self) {}

  /// Push: display the fixed exercise reminder. The push body is never read.
  async fn on_push(&self) -> Result<()> {
    let payload = notify::reminder_payload(chrono::Utc::now());
    self.host.show_notification(&payload)
  }

  /// Notification click: dismiss first, then dispatch on the action id.
  /// Unknown ids and plain body clicks both open the app root.
  fn on_notification_click(&self, action: Option<&str>) -> Result<()> {
    self.host.dismiss_notification(notify::NOTIFICATION_TAG);

    match action {
      Some(notify::ACTION_START) => {
        let url = self.config.resolve("/?action=start")?;
        self.host.open_window(&url)
      }
      Some(notify::ACTION_CLOSE) => Ok(()),
      _ => {
        let url = self.config.resolve("/")?;
        self.host.open_window(&url)
      }
    }
  }
}
