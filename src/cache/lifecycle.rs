//! Install and activate transitions for the versioned tiers.

use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::storage::TierStore;
use super::traits::{RequestKey, TierNames};
use crate::http::Request;
use crate::network::Network;

/// Populate the static tier with every listed asset.
///
/// All assets are fetched before anything is written, so a failed install
/// leaves the tier untouched.
pub async fn install(
  network: &dyn Network,
  tiers: &dyn TierStore,
  names: &TierNames,
  assets: &[Url],
) -> Result<usize> {
  let mut fetched = Vec::with_capacity(assets.len());
  for url in assets {
    let response = network
      .fetch(&Request::get(url.clone()))
      .await
      .map_err(|e| eyre!("Install failed fetching {}: {}", url, e))?;
    if !response.is_success() {
      return Err(eyre!(
        "Install failed: {} returned status {}",
        url,
        response.status
      ));
    }
    fetched.push((RequestKey::for_url(url), response));
  }

  tiers.open(&names.static_tier).await?;
  for (key, response) in &fetched {
    tiers.put(&names.static_tier, key, response).await?;
  }

  tracing::info!(tier = %names.static_tier, assets = fetched.len(), "static tier populated");
  Ok(fetched.len())
}

/// Whether the static tier holds every listed asset.
///
/// A tier that exists but is missing entries counts as not installed, so an
/// interrupted install is retried.
pub async fn is_installed(tiers: &dyn TierStore, names: &TierNames, assets: &[Url]) -> Result<bool> {
  if !tiers.tier_names().await?.contains(&names.static_tier) {
    return Ok(false);
  }
  for url in assets {
    if tiers
      .get(&names.static_tier, &RequestKey::for_url(url))
      .await?
      .is_none()
    {
      return Ok(false);
    }
  }
  Ok(true)
}

/// Open the valid tiers and delete every other one.
///
/// Returns the names of the deleted tiers.
pub async fn activate(tiers: &dyn TierStore, names: &TierNames) -> Result<Vec<String>> {
  let valid = names.all();
  for name in &valid {
    tiers.open(name).await?;
  }

  let mut deleted = Vec::new();
  for name in tiers.tier_names().await? {
    if !valid.contains(&name) {
      tiers.delete_tier(&name).await?;
      tracing::info!(tier = %name, "deleted stale cache tier");
      deleted.push(name);
    }
  }

  Ok(deleted)
}
