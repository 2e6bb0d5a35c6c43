//! Caching strategies.
//!
//! Each strategy composes one tier with the network and never fails: network
//! errors become a cache fallback or one of the synthetic 503 responses.
//! Each strategy only writes to its own tier:
//!
//! | strategy               | tier    |
//! |------------------------|---------|
//! | cache-first            | static  |
//! | network-first          | dynamic |
//! | stale-while-revalidate | api     |

mod cache_first;
mod network_first;
pub mod offline;
mod stale_while_revalidate;

use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::cache::{CachedEntry, RequestKey, TierKind, TierNames, TierStore};
use crate::http::{Request, Response, Served};
use crate::network::Network;

/// The closed set of strategies a request can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

impl StrategyKind {
  /// Tier this strategy reads and writes.
  pub fn tier(self) -> TierKind {
    match self {
      Self::CacheFirst => TierKind::Static,
      Self::NetworkFirst => TierKind::Dynamic,
      Self::StaleWhileRevalidate => TierKind::Api,
    }
  }
}

impl fmt::Display for StrategyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::CacheFirst => "cache-first",
      Self::NetworkFirst => "network-first",
      Self::StaleWhileRevalidate => "stale-while-revalidate",
    })
  }
}

/// Executes strategies against shared tiers and the network.
#[derive(Clone)]
pub struct StrategyEngine {
  tiers: Arc<dyn TierStore>,
  network: Arc<dyn Network>,
  names: TierNames,
  app_name: String,
  /// Background refreshes still owed to the api tier
  revalidations: Arc<Mutex<Vec<JoinHandle<Option<Response>>>>>,
}

impl StrategyEngine {
  pub fn new(
    tiers: Arc<dyn TierStore>,
    network: Arc<dyn Network>,
    names: TierNames,
    app_name: impl Into<String>,
  ) -> Self {
    Self {
      tiers,
      network,
      names,
      app_name: app_name.into(),
      revalidations: Arc::default(),
    }
  }

  /// Wait for every background refresh started so far.
  ///
  /// Hosts call this before shutting down so stale-while-revalidate writes
  /// are not cancelled with the runtime.
  pub async fn drain(&self) {
    let pending = match self.revalidations.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(e) => {
        tracing::warn!(error = %e, "revalidation list poisoned");
        return;
      }
    };

    if !pending.is_empty() {
      tracing::debug!(pending = pending.len(), "waiting for background revalidation");
    }
    for handle in pending {
      if let Err(e) = handle.await {
        tracing::warn!(error = %e, "revalidation task failed");
      }
    }
  }

  fn track(&self, handle: JoinHandle<Option<Response>>) {
    match self.revalidations.lock() {
      Ok(mut pending) => {
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
      }
      Err(e) => tracing::warn!(error = %e, "revalidation list poisoned"),
    }
  }

  pub async fn handle(&self, kind: StrategyKind, request: &Request) -> Served {
    let served = match kind {
      StrategyKind::CacheFirst => self.cache_first(request).await,
      StrategyKind::NetworkFirst => self.network_first(request).await,
      StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
    };

    tracing::debug!(
      strategy = %kind,
      tier = self.tier(kind.tier()),
      url = %request.url,
      status = served.response.status,
      source = ?served.source,
      "request served"
    );
    served
  }

  fn tier(&self, kind: TierKind) -> &str {
    self.names.get(kind)
  }

  /// Tier read where a storage failure counts as a miss.
  async fn lookup(&self, kind: TierKind, key: &RequestKey) -> Option<CachedEntry> {
    lookup(self.tiers.as_ref(), self.tier(kind), key).await
  }

  /// Best-effort write-through.
  async fn store(&self, kind: TierKind, key: &RequestKey, response: &Response) {
    store(self.tiers.as_ref(), self.tier(kind), key, response).await
  }
}

async fn lookup(tiers: &dyn TierStore, tier: &str, key: &RequestKey) -> Option<CachedEntry> {
  match tiers.get(tier, key).await {
    Ok(Some(entry)) => {
      tracing::trace!(tier, url = %entry.url, "cache hit");
      Some(entry)
    }
    Ok(None) => None,
    Err(e) => {
      tracing::warn!(tier, key = %key, error = %e, "cache read failed, treating as miss");
      None
    }
  }
}

/// Only 2xx responses are ever written.
async fn store(tiers: &dyn TierStore, tier: &str, key: &RequestKey, response: &Response) {
  if !response.is_success() {
    return;
  }
  if let Err(e) = tiers.put(tier, key, response).await {
    tracing::warn!(tier, key = %key, error = %e, "cache write failed");
  }
}
