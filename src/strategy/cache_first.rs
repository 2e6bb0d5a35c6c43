use super::{offline, StrategyEngine};
use crate::cache::{RequestKey, TierKind};
use crate::http::{Request, Served};

impl StrategyEngine {
  /// Serve from the static tier, fetching and storing on a miss.
  pub async fn cache_first(&self, request: &Request) -> Served {
    let key = RequestKey::for_url(&request.url);
    if let Some(entry) = self.lookup(TierKind::Static, &key).await {
      return Served::from_cache(entry.response, entry.cached_at);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        self.store(TierKind::Static, &key, &response).await;
        Served::from_network(response)
      }
      Err(e) => {
        tracing::debug!(url = %request.url, error = %e, "cache-first miss while offline");
        Served::offline(offline::unavailable())
      }
    }
  }
}
