//! Network boundary.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};

use crate::http::{Request, Response};

/// Anything that can satisfy a request over the network.
///
/// An `Err` means the fetch itself failed (offline, DNS, reset). A non-2xx
/// status is still an `Ok` response.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed network client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("fueltracker-sw/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {} {}: {}", request.method, request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    tracing::debug!(method = %request.method, url = %request.url, status, "fetched");

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
pub mod testing {
  //! Scripted network used by the unit tests.

  use super::*;
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};
  use tokio::sync::Notify;

  type Handler = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

  #[derive(Default)]
  struct Script {
    routes: HashMap<String, Option<Response>>,
    handler: Option<Handler>,
    calls: Vec<Request>,
  }

  /// Unscripted URLs fail as if offline.
  #[derive(Clone, Default)]
  pub struct FakeNetwork {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Notify>>,
  }

  impl FakeNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    /// Every fetch waits for `gate.notify_one()` before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
      Self {
        script: Arc::default(),
        gate: Some(gate),
      }
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
      self.script.lock().unwrap().routes.insert(
        url.to_string(),
        Some(Response::new(status, "text/plain", body)),
      );
    }

    /// Answer every request with `f`; `None` fails the fetch.
    pub fn respond_with<F>(&self, f: F)
    where
      F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
    {
      self.script.lock().unwrap().handler = Some(Arc::new(f));
    }

    pub fn fail(&self, url: &str) {
      self.script.lock().unwrap().routes.insert(url.to_string(), None);
    }

    pub fn calls(&self) -> Vec<Request> {
      self.script.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
      self
        .script
        .lock()
        .unwrap()
        .calls
        .iter()
        .filter(|r| r.url.as_str() == url)
        .count()
    }
  }

  #[async_trait]
  impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.script.lock().unwrap().calls.push(request.clone());
      if let Some(gate) = &self.gate {
        gate.notified().await;
      }
      let script = self.script.lock().unwrap();
      let route = match &script.handler {
        Some(handler) => handler(request),
        None => script.routes.get(request.url.as_str()).cloned().flatten(),
      };
      drop(script);
      route.ok_or_else(|| eyre!("offline: {}", request.url))
    }
  }
}
