//! Push notification payloads.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Action id that starts the breathing exercise.
pub const ACTION_START: &str = "start-exercise";
/// Action id that just closes the notification.
pub const ACTION_CLOSE: &str = "close";

/// Tag identifying the reminder notification, used for dismissal.
pub const NOTIFICATION_TAG: &str = "breath-reminder";

/// One button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: Option<String>,
}

/// Data object carried by the notification.
///
/// Serializes with the platform's field names (`dateOfArrival`, `primaryKey`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  pub date_of_arrival: DateTime<Utc>,
  pub primary_key: u32,
}

/// Everything the host needs to display one notification.
///
/// Ephemeral: built fresh per push event, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
  pub tag: String,
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

/// The fixed exercise reminder shown for every push event.
///
/// Push message bodies are never read; only the arrival time varies.
pub fn reminder_payload(arrived_at: DateTime<Utc>) -> NotificationPayload {
  NotificationPayload {
    tag: NOTIFICATION_TAG.to_string(),
    title: "Breath Trainer".to_string(),
    body: "Time for your breathing exercise! \u{1F4A8}".to_string(),
    icon: "/icons/icon-192x192.png".to_string(),
    badge: "/icons/icon-72x72.png".to_string(),
    vibrate: vec![100, 50, 100],
    data: NotificationData {
      date_of_arrival: arrived_at,
      primary_key: 1,
    },
    actions: vec![
      NotificationAction {
        action: ACTION_START.to_string(),
        title: "Start exercise".to_string(),
        icon: Some("/icons/icon-96x96.png".to_string()),
      },
      NotificationAction {
        action: ACTION_CLOSE.to_string(),
        title: "Close".to_string(),
        icon: None,
      },
    ],
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reminder_has_exactly_two_actions() {
    let payload = reminder_payload(Utc::now());
    let ids: Vec<&str> = payload.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(ids, vec![ACTION_START, ACTION_CLOSE]);
  }

  #[test]
  fn test_reminder_body_is_fixed() {
    let payload = reminder_payload(Utc::now());
    assert_eq!(payload.body, "Time for your breathing exercise! \u{1F4A8}");
    assert_eq!(payload.vibrate, vec![100, 50, 100]);
    assert_eq!(payload.data.primary_key, 1);
  }

  #[test]
  fn test_reminder_stamps_arrival_time() {
    let arrived = Utc::now();
    let payload = reminder_payload(arrived);
    assert_eq!(payload.data.date_of_arrival, arrived);
  }

  #[test]
  fn test_data_serializes_with_platform_field_names() {
    let payload = reminder_payload(Utc::now());
    let json = serde_json::to_value(&payload.data).unwrap();
    assert!(json.get("dateOfArrival").is_some());
    assert_eq!(json.get("primaryKey").unwrap(), 1);
  }
}
