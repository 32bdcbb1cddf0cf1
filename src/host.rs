//! Host platform seam: lifecycle control, notification display, windows.
//!
//! The display surface and window manager live outside this worker; they are
//! consumed as black boxes behind [`WorkerHost`].

use color_eyre::Result;
use tracing::info;
use url::Url;

use crate::notify::NotificationPayload;

/// Operations the worker asks of its host runtime.
pub trait WorkerHost: Send + Sync {
  /// Skip the waiting lifecycle phase so this worker version activates
  /// as soon as installation finishes.
  fn skip_waiting(&self);

  /// Take control of all open clients immediately, without a reload.
  fn claim(&self);

  /// Display a notification.
  fn show_notification(&self, payload: &NotificationPayload) -> Result<()>;

  /// Dismiss a displayed notification by tag.
  fn dismiss_notification(&self, tag: &str);

  /// Open (or focus) a client window at `url`.
  fn open_window(&self, url: &Url) -> Result<()>;
}

/// Host adapter that records every intent to the log.
///
/// Stands in for the platform surface when the worker runs headless.
pub struct LogHost;

impl WorkerHost for LogHost {
  fn skip_waiting(&self) {
    info!("skip waiting: activating as soon as installation settles");
  }

  fn claim(&self) {
    info!("claiming all open clients");
  }

  fn show_notification(&self, payload: &NotificationPayload) -> Result<()> {
    info!(
      tag = %payload.tag,
      title = %payload.title,
      body = %payload.body,
      actions = payload.actions.len(),
      "showing notification"
    );
    Ok(())
  }

  fn dismiss_notification(&self, tag: &str) {
    info!(tag, "dismissing notification");
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    info!(%url, "opening client window");
    Ok(())
  }
}
