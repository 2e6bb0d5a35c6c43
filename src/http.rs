//! Request and response snapshots exchanged with the network boundary.

use chrono::{DateTime, Utc};
use reqwest::Method;
use url::Url;

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  /// Set by the host for top-level page navigations
  pub navigate: bool,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      body: None,
      navigate: false,
    }
  }

  /// A JSON POST, as used for queue replay.
  pub fn post_json(url: Url, payload: &serde_json::Value) -> Self {
    Self {
      method: Method::POST,
      url,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(payload.to_string().into_bytes()),
      navigate: false,
    }
  }

  pub fn navigation(mut self) -> Self {
    self.navigate = true;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Page navigations get the offline document instead of a bare 503.
  pub fn is_navigation(&self) -> bool {
    self.navigate
      || (self.method == Method::GET
        && self
          .header("accept")
          .is_some_and(|accept| accept.contains("text/html")))
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }
}

/// A captured response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: vec![("Content-Type".to_string(), content_type.to_string())],
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Fresh from the network
  Network,
  /// From a cache tier
  Cache,
  /// Synthesized because neither network nor cache could answer
  Offline,
}

/// A response handed back to the host, with its provenance.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: Source,
  /// When the entry was cached (cache hits only)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: Source::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(response: Response, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: Source::Cache,
      cached_at: Some(cached_at),
    }
  }

  pub fn offline(response: Response) -> Self {
    Self {
      response,
      source: Source::Offline,
      cached_at: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_accept_html_is_navigation() {
    let req = Request::get(url("http://localhost/fuel")).with_header("Accept", "text/html,*/*");
    assert!(req.is_navigation());
    assert!(!Request::get(url("http://localhost/fuel")).is_navigation());
  }

  #[test]
  fn test_post_json_sets_content_type() {
    let req = Request::post_json(url("http://localhost/x"), &serde_json::json!({"liters": 40}));
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.body.as_deref(), Some(br#"{"liters":40}"#.as_slice()));
    assert!(!req.is_navigation());
  }

  #[test]
  fn test_success_range() {
    assert!(Response::new(204, "text/plain", "").is_success());
    assert!(!Response::new(304, "text/plain", "").is_success());
    assert!(!Response::new(503, "text/plain", "").is_success());
  }
}
