use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{offline, store, StrategyEngine};
use crate::cache::{RequestKey, TierKind};
use crate::http::{Request, Response, Served};

impl StrategyEngine {
  /// Serve the API tier immediately and refresh it in the background.
  ///
  /// The caller only waits for the network when the tier has no copy.
  pub async fn stale_while_revalidate(&self, request: &Request) -> Served {
    let key = RequestKey::for_url(&request.url);
    let revalidation = self.revalidate(request.clone(), key.clone());

    if let Some(entry) = self.lookup(TierKind::Api, &key).await {
      self.track(revalidation);
      return Served::from_cache(entry.response, entry.cached_at);
    }

    match revalidation.await {
      Ok(Some(response)) => Served::from_network(response),
      Ok(None) => Served::offline(offline::unavailable()),
      Err(e) => {
        tracing::warn!(url = %request.url, error = %e, "revalidation task failed");
        Served::offline(offline::unavailable())
      }
    }
  }

  /// Background fetch whose only side effect is a conditional tier write.
  fn revalidate(&self, request: Request, key: RequestKey) -> JoinHandle<Option<Response>> {
    let tiers = Arc::clone(&self.tiers);
    let network = Arc::clone(&self.network);
    let tier = self.tier(TierKind::Api).to_string();

    tokio::spawn(async move {
      match network.fetch(&request).await {
        Ok(response) => {
          store(tiers.as_ref(), &tier, &key, &response).await;
          Some(response)
        }
        Err(e) => {
          tracing::debug!(url = %request.url, error = %e, "revalidation failed, keeping cached copy");
          None
        }
      }
    })
  }
}
