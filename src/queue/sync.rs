//! Replay of queued mutations after a reconnect signal.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use url::Url;

use super::store::{QueueRecord, QueueStore};
use crate::http::Request;
use crate::network::Network;

/// Outcome of one replay pass over a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
  pub queue: String,
  /// Records submitted to the endpoint
  pub attempted: usize,
  /// Records submitted and removed
  pub replayed: usize,
  /// Records left in place for the next signal
  pub failed: usize,
  /// Another pass over the same queue was already running
  pub skipped: bool,
}

/// Drains logical queues against their bound endpoints.
#[derive(Clone)]
pub struct SyncCoordinator {
  store: Arc<dyn QueueStore>,
  network: Arc<dyn Network>,
  endpoints: BTreeMap<String, Url>,
  in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SyncCoordinator {
  pub fn new(
    store: Arc<dyn QueueStore>,
    network: Arc<dyn Network>,
    endpoints: BTreeMap<String, Url>,
  ) -> Self {
    Self {
      store,
      network,
      endpoints,
      in_flight: Arc::default(),
    }
  }

  pub fn queues(&self) -> impl Iterator<Item = &str> {
    self.endpoints.keys().map(String::as_str)
  }

  /// Replay every record of `queue` in order, deleting those that succeed.
  ///
  /// A failed record stays in the store and the pass moves on to the next.
  pub async fn replay(&self, queue: &str) -> Result<ReplaySummary> {
    let endpoint = self
      .endpoints
      .get(queue)
      .ok_or_else(|| eyre!("No endpoint configured for queue {}", queue))?;

    let mut summary = ReplaySummary {
      queue: queue.to_string(),
      ..ReplaySummary::default()
    };

    let Some(_guard) = InFlight::acquire(&self.in_flight, queue)? else {
      tracing::info!(queue, "replay already in progress, skipping");
      summary.skipped = true;
      return Ok(summary);
    };

    let records = self.store.list_all(queue).await?;
    if records.is_empty() {
      tracing::debug!(queue, "nothing to replay");
      return Ok(summary);
    }

    tracing::info!(queue, pending = records.len(), endpoint = %endpoint, "replaying queued records");

    for record in records {
      summary.attempted += 1;
      if self.replay_record(endpoint, &record).await {
        summary.replayed += 1;
      } else {
        summary.failed += 1;
      }
    }

    tracing::info!(
      queue,
      replayed = summary.replayed,
      failed = summary.failed,
      "replay finished"
    );
    Ok(summary)
  }

  /// Replay every configured queue concurrently.
  pub async fn replay_all(&self) -> Vec<Result<ReplaySummary>> {
    join_all(self.queues().map(|queue| self.replay(queue))).await
  }

  async fn replay_record(&self, endpoint: &Url, record: &QueueRecord) -> bool {
    let target = record.target.as_ref().unwrap_or(endpoint);
    let request = Request::post_json(target.clone(), &record.payload);

    match self.network.fetch(&request).await {
      Ok(response) if response.is_success() => {
        if let Err(e) = self.store.delete(&record.queue, record.id).await {
          tracing::warn!(queue = %record.queue, id = record.id, error = %e, "replayed record could not be removed");
          return false;
        }
        tracing::debug!(queue = %record.queue, id = record.id, "record replayed");
        true
      }
      Ok(response) => {
        tracing::warn!(queue = %record.queue, id = record.id, status = response.status, "replay rejected, keeping record");
        false
      }
      Err(e) => {
        tracing::warn!(queue = %record.queue, id = record.id, error = %e, "replay failed, keeping record");
        false
      }
    }
  }
}

/// Marks a queue as being replayed until dropped.
struct InFlight {
  set: Arc<Mutex<HashSet<String>>>,
  queue: String,
}

impl InFlight {
  fn acquire(set: &Arc<Mutex<HashSet<String>>>, queue: &str) -> Result<Option<Self>> {
    let mut active = set.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if !active.insert(queue.to_string()) {
      return Ok(None);
    }
    Ok(Some(Self {
      set: Arc::clone(set),
      queue: queue.to_string(),
    }))
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    if let Ok(mut active) = self.set.lock() {
      active.remove(&self.queue);
    }
  }
}
