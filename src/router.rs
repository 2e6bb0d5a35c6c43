//! Request classification.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::http::Request;
use crate::strategy::StrategyKind;

/// Pure classifier from request shape to strategy.
#[derive(Debug, Clone)]
pub struct Router {
  static_assets: Vec<String>,
  api_patterns: Vec<String>,
  static_extensions: BTreeSet<String>,
}

impl Router {
  pub fn new(
    static_assets: Vec<String>,
    api_patterns: Vec<String>,
    static_extensions: BTreeSet<String>,
  ) -> Self {
    Self {
      static_assets,
      api_patterns,
      static_extensions: static_extensions
        .into_iter()
        .map(|ext| ext.to_lowercase())
        .collect(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(
      config.static_assets.clone(),
      config.api_patterns.clone(),
      config.static_extensions.clone(),
    )
  }

  /// First match wins.
  pub fn classify(&self, request: &Request) -> StrategyKind {
    if !request.is_get() {
      return StrategyKind::NetworkFirst;
    }

    let path = request.url.path();
    if self.is_static_asset(request) {
      return StrategyKind::CacheFirst;
    }
    if self.api_patterns.iter().any(|p| path.contains(p.as_str())) {
      return StrategyKind::StaleWhileRevalidate;
    }
    if self.has_static_extension(path) {
      return StrategyKind::CacheFirst;
    }

    StrategyKind::NetworkFirst
  }

  fn is_static_asset(&self, request: &Request) -> bool {
    let full = request.url.as_str();
    let path = request.url.path();
    let path_and_query = match request.url.query() {
      Some(q) => format!("{}?{}", path, q),
      None => path.to_string(),
    };

    self.static_assets.iter().any(|asset| {
      let exact = asset == full || asset == path || *asset == path_and_query;
      // "/" is a substring of every URL, so the root only matches exactly
      exact || (asset != "/" && full.contains(asset.as_str()))
    })
  }

  fn has_static_extension(&self, path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => {
        self.static_extensions.contains(&ext.to_lowercase())
      }
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn router() -> Router {
    Router::from_config(&Config::default())
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  fn with_method(url: &str, method: Method) -> Request {
    Request {
      method,
      ..get(url)
    }
  }

  #[test]
  fn test_non_get_is_network_first() {
    let router = router();
    for url in [
      "http://localhost:5000/static/icons/icon-192.png",
      "http://localhost:5000/api/vehicles",
      "http://localhost:5000/add_fuel_record/3",
      "http://localhost:5000/",
    ] {
      for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
        assert_eq!(
          router.classify(&with_method(url, method)),
          StrategyKind::NetworkFirst
        );
      }
    }
  }

  #[test]
  fn test_allowlisted_assets_are_cache_first() {
    let router = router();
    for asset in &Config::default().static_assets {
      let url = Config::default().resolve(asset).unwrap();
      assert_eq!(
        router.classify(&Request::get(url)),
        StrategyKind::CacheFirst,
        "{}",
        asset
      );
    }
  }

  #[test]
  fn test_root_entry_matches_only_root() {
    let router = router();
    assert_eq!(
      router.classify(&get("http://localhost:5000/")),
      StrategyKind::CacheFirst
    );
    assert_eq!(
      router.classify(&get("http://localhost:5000/reports")),
      StrategyKind::NetworkFirst
    );
  }

  #[test]
  fn test_api_patterns_are_stale_while_revalidate() {
    let router = router();
    for url in [
      "http://localhost:5000/api/fuel_stats",
      "http://localhost:5000/dashboard",
      "http://localhost:5000/vehicles/4",
    ] {
      assert_eq!(
        router.classify(&get(url)),
        StrategyKind::StaleWhileRevalidate
      );
    }
  }

  #[test]
  fn test_allowlist_wins_over_api_pattern() {
    let router = Router::new(
      vec!["/api/manifest".to_string()],
      vec!["/api/".to_string()],
      BTreeSet::new(),
    );
    assert_eq!(
      router.classify(&get("http://localhost/api/manifest")),
      StrategyKind::CacheFirst
    );
  }

  #[test]
  fn test_api_pattern_wins_over_extension() {
    let router = router();
    assert_eq!(
      router.classify(&get("http://localhost:5000/api/chart.png")),
      StrategyKind::StaleWhileRevalidate
    );
  }

  #[test]
  fn test_static_extensions_are_cache_first() {
    let router = router();
    for url in [
      "http://localhost:5000/static/logo.SVG",
      "http://localhost:5000/static/app.css",
      "http://localhost:5000/static/photo.jpeg?v=2",
    ] {
      assert_eq!(router.classify(&get(url)), StrategyKind::CacheFirst);
    }
  }

  #[test]
  fn test_everything_else_is_network_first() {
    let router = router();
    for url in [
      "http://localhost:5000/login",
      "http://localhost:5000/reports/monthly.pdf",
      "http://localhost:5000/static/.css",
    ] {
      assert_eq!(router.classify(&get(url)), StrategyKind::NetworkFirst);
    }
  }
}
