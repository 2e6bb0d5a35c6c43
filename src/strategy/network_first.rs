use super::{offline, StrategyEngine};
use crate::cache::{RequestKey, TierKind};
use crate::http::{Request, Served};

impl StrategyEngine {
  /// Prefer the network, falling back to the dynamic tier when it fails.
  pub async fn network_first(&self, request: &Request) -> Served {
    // Tiers only hold GET responses; mutations go straight through
    let key = request.is_get().then(|| RequestKey::for_url(&request.url));

    match self.network.fetch(request).await {
      Ok(response) => {
        if let Some(key) = &key {
          self.store(TierKind::Dynamic, key, &response).await;
        }
        Served::from_network(response)
      }
      Err(e) => {
        tracing::debug!(method = %request.method, url = %request.url, error = %e, "network-first fetch failed");

        if let Some(key) = &key {
          if let Some(entry) = self.lookup(TierKind::Dynamic, key).await {
            return Served::from_cache(entry.response, entry.cached_at);
          }
        }

        if request.is_navigation() {
          let retry = match request.url.query() {
            Some(q) => format!("{}?{}", request.url.path(), q),
            None => request.url.path().to_string(),
          };
          Served::offline(offline::offline_page(&self.app_name, &retry))
        } else {
          Served::offline(offline::unavailable())
        }
      }
    }
  }
}
