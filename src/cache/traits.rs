//! Core types for the cache tiers.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

use crate::http::Response;

/// The three tiers, each owned by one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
  /// Install-time assets, served cache-first
  Static,
  /// Pages, written by network-first
  Dynamic,
  /// API and dynamic routes, served stale-while-revalidate
  Api,
}

impl TierKind {
  pub const ALL: [TierKind; 3] = [TierKind::Static, TierKind::Dynamic, TierKind::Api];

  pub fn suffix(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Dynamic => "dynamic",
      Self::Api => "api",
    }
  }
}

/// The current valid set of tier names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierNames {
  pub static_tier: String,
  pub dynamic_tier: String,
  pub api_tier: String,
}

impl TierNames {
  /// `{prefix}-{version}-{kind}`, or `{version}-{kind}` with an empty prefix.
  pub fn versioned(prefix: &str, version: &str) -> Self {
    let name = |kind: TierKind| {
      if prefix.is_empty() {
        format!("{}-{}", version, kind.suffix())
      } else {
        format!("{}-{}-{}", prefix, version, kind.suffix())
      }
    };

    Self {
      static_tier: name(TierKind::Static),
      dynamic_tier: name(TierKind::Dynamic),
      api_tier: name(TierKind::Api),
    }
  }

  pub fn get(&self, kind: TierKind) -> &str {
    match kind {
      TierKind::Static => &self.static_tier,
      TierKind::Dynamic => &self.dynamic_tier,
      TierKind::Api => &self.api_tier,
    }
  }

  pub fn all(&self) -> BTreeSet<String> {
    TierKind::ALL
      .iter()
      .map(|kind| self.get(*kind).to_string())
      .collect()
  }
}

/// Normalized request identity used as the tier key.
///
/// Tiers only ever hold GET responses, so the method is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
  pub fn for_url(url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self(format!("GET {}", url))
  }

  #[cfg(test)]
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// SHA256 hash for stable, fixed-length storage keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.0.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A response snapshot stored in a tier.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub url: String,
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}
