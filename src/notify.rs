//! Push notifications and click routing.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BODY: &str = "Novo update no FuelTracker Pro!";
const DEFAULT_URL: &str = "/dashboard";
const ICON: &str = "/static/icons/icon-192.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  View,
  Dismiss,
}

impl Action {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "view" | "explore" => Some(Self::View),
      "dismiss" | "close" => Some(Self::Dismiss),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  /// Opened by the view action
  pub url: String,
  pub icon: String,
  pub actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  url: Option<String>,
}

impl Notification {
  /// Build a notification from a push payload.
  ///
  /// JSON objects may set `title`, `body` and `url`; anything else is shown
  /// as plain text.
  pub fn from_push(payload: Option<&[u8]>, app_name: &str) -> Self {
    let mut notification = Self {
      title: app_name.to_string(),
      body: DEFAULT_BODY.to_string(),
      url: DEFAULT_URL.to_string(),
      icon: ICON.to_string(),
      actions: vec![Action::View, Action::Dismiss],
    };

    let Some(raw) = payload.filter(|p| !p.is_empty()) else {
      return notification;
    };

    match serde_json::from_slice::<PushPayload>(raw) {
      Ok(parsed) => {
        if let Some(title) = parsed.title {
          notification.title = title;
        }
        if let Some(body) = parsed.body {
          notification.body = body;
        }
        if let Some(url) = parsed.url {
          notification.url = url;
        }
      }
      Err(_) => notification.body = String::from_utf8_lossy(raw).into_owned(),
    }

    notification
  }

  /// Where a click on this notification leads.
  pub fn click_target(&self, action: Option<Action>) -> &str {
    match action {
      Some(Action::View) => &self.url,
      _ => "/",
    }
  }
}
