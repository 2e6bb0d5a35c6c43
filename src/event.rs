use crate::http::{Request, Served};
use crate::notify::{Action, Notification};
use crate::queue::ReplaySummary;

/// Signals raised by the host environment
#[derive(Debug)]
pub enum Event {
  /// Populate the static tier, then wait for activation
  Install,
  /// Purge stale tiers, then start serving
  Activate,
  /// An intercepted request
  Fetch(Request),
  /// Connectivity restored for the queue(s) bound to `tag`
  Sync { tag: String },
  /// Push message with an optional payload
  Push { payload: Option<Vec<u8>> },
  /// The user clicked a notification (or one of its actions)
  NotificationClick {
    notification: Notification,
    action: Option<Action>,
  },
}

/// What the worker hands back for each event
#[derive(Debug)]
pub enum Reply {
  Installed { assets: usize },
  Activated { deleted: Vec<String> },
  /// `queued` holds the record id when a failed mutation was queued
  Served { served: Served, queued: Option<i64> },
  Synced(Vec<ReplaySummary>),
  Notify(Notification),
  Navigate(String),
}
