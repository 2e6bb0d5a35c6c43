//! Host-facing worker: lifecycle, interception, queueing and sync signals.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

use crate::cache::{lifecycle, NoopTierStore, SqliteTierStore, TierStore};
use crate::config::Config;
use crate::db::Database;
use crate::event::{Event, Reply};
use crate::http::{Request, Served, Source};
use crate::network::{HttpNetwork, Network};
use crate::notify::Notification;
use crate::queue::{
  QueueRecord, QueueStore, ReplaySummary, SqliteQueueStore, SyncCoordinator,
  UnavailableQueueStore,
};
use crate::router::Router;
use crate::strategy::{offline, StrategyEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Static tier not populated yet; requests pass straight through
  Installing,
  /// Installed, waiting for activation
  Waiting,
  /// Routing requests through the strategies
  Active,
}

pub struct Worker {
  config: Config,
  state: LifecycleState,
  router: Router,
  engine: StrategyEngine,
  sync: SyncCoordinator,
  tiers: Arc<dyn TierStore>,
  queue: Arc<dyn QueueStore>,
  network: Arc<dyn Network>,
  endpoints: BTreeMap<String, Url>,
}

impl Worker {
  pub fn new(
    config: Config,
    tiers: Arc<dyn TierStore>,
    queue: Arc<dyn QueueStore>,
    network: Arc<dyn Network>,
  ) -> Result<Self> {
    let endpoints = config
      .queues
      .iter()
      .map(|(name, q)| -> Result<(String, Url)> {
        Ok((name.clone(), config.resolve(&q.endpoint)?))
      })
      .collect::<Result<BTreeMap<_, _>>>()?;

    let engine = StrategyEngine::new(
      Arc::clone(&tiers),
      Arc::clone(&network),
      config.tier_names(),
      config.app_name.clone(),
    );
    let sync = SyncCoordinator::new(Arc::clone(&queue), Arc::clone(&network), endpoints.clone());

    Ok(Self {
      router: Router::from_config(&config),
      config,
      state: LifecycleState::Installing,
      engine,
      sync,
      tiers,
      queue,
      network,
      endpoints,
    })
  }

  /// Open the durable store and HTTP client for `config`.
  ///
  /// Without durable storage the worker still serves requests, with tiers
  /// that always miss and a queue that is permanently empty.
  pub fn open(config: Config) -> Result<Self> {
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new()?);

    let db = config.database_path().and_then(|path| {
      tracing::debug!(path = %path.display(), "opening durable store");
      Database::open(&path)
    });
    let (tiers, queue): (Arc<dyn TierStore>, Arc<dyn QueueStore>) = match db {
      Ok(db) => (
        Arc::new(SqliteTierStore::new(db.clone())),
        Arc::new(SqliteQueueStore::new(db)),
      ),
      Err(e) => {
        tracing::warn!(error = %e, "durable storage unavailable, running without caches or queue");
        (Arc::new(NoopTierStore), Arc::new(UnavailableQueueStore))
      }
    };

    Self::new(config, tiers, queue, network)
  }

  pub fn state(&self) -> LifecycleState {
    self.state
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub async fn handle(&mut self, event: Event) -> Result<Reply> {
    match event {
      Event::Install => Ok(Reply::Installed {
        assets: self.install().await?,
      }),
      Event::Activate => Ok(Reply::Activated {
        deleted: self.activate().await?,
      }),
      Event::Fetch(request) => {
        let (served, queued) = self.submit(&request).await?;
        Ok(Reply::Served { served, queued })
      }
      Event::Sync { tag } => Ok(Reply::Synced(self.sync(&tag).await?)),
      Event::Push { payload } => Ok(Reply::Notify(self.push(payload.as_deref()))),
      Event::NotificationClick {
        notification,
        action,
      } => Ok(Reply::Navigate(
        notification.click_target(action).to_string(),
      )),
    }
  }

  /// Populate the static tier; on success the worker waits for activation.
  pub async fn install(&mut self) -> Result<usize> {
    let assets = self.static_assets()?;
    let count = lifecycle::install(
      self.network.as_ref(),
      self.tiers.as_ref(),
      &self.config.tier_names(),
      &assets,
    )
    .await?;

    self.state = LifecycleState::Waiting;
    Ok(count)
  }

  fn static_assets(&self) -> Result<Vec<Url>> {
    self
      .config
      .static_assets
      .iter()
      .map(|asset| self.config.resolve(asset))
      .collect()
  }

  /// Delete stale tiers, then start routing requests.
  pub async fn activate(&mut self) -> Result<Vec<String>> {
    let deleted = lifecycle::activate(self.tiers.as_ref(), &self.config.tier_names()).await?;
    self.state = LifecycleState::Active;
    tracing::info!(version = %self.config.cache_version, "worker active");
    Ok(deleted)
  }

  /// Install when the current static tier is missing, then activate.
  ///
  /// A failed install leaves the worker passing requests through.
  pub async fn ensure_active(&mut self) -> Result<()> {
    if self.state == LifecycleState::Active {
      return Ok(());
    }

    let installed = lifecycle::is_installed(
      self.tiers.as_ref(),
      &self.config.tier_names(),
      &self.static_assets()?,
    )
    .await?;

    if !installed && self.state == LifecycleState::Installing {
      if let Err(e) = self.install().await {
        tracing::warn!(error = %e, "install failed, passing requests through");
        return Ok(());
      }
    }

    self.activate().await?;
    Ok(())
  }

  /// Let background revalidation finish before the host exits.
  pub async fn drain(&self) {
    self.engine.drain().await;
  }

  /// Route and serve one request. Never fails.
  pub async fn fetch(&self, request: &Request) -> Served {
    if self.state != LifecycleState::Active {
      return match self.network.fetch(request).await {
        Ok(response) => Served::from_network(response),
        Err(e) => {
          tracing::debug!(url = %request.url, error = %e, "pass-through fetch failed");
          Served::offline(offline::unavailable())
        }
      };
    }

    let kind = self.router.classify(request);
    self.engine.handle(kind, request).await
  }

  /// Serve a request, queueing it when it is a mutation that could not
  /// reach a queue-bound endpoint.
  pub async fn submit(&self, request: &Request) -> Result<(Served, Option<i64>)> {
    let served = self.fetch(request).await;
    if request.is_get() || served.source != Source::Offline {
      return Ok((served, None));
    }

    let Some(queue) = self.queue_for_endpoint(&request.url) else {
      return Ok((served, None));
    };

    let payload = request_payload(request);
    match self.enqueue(queue, Some(&request.url), &payload).await {
      Ok(id) => Ok((served, Some(id))),
      Err(e) => {
        tracing::warn!(queue, error = %e, "offline mutation could not be queued");
        Ok((served, None))
      }
    }
  }

  /// Append a failed mutation to a logical queue.
  ///
  /// `target` is the URL the mutation was sent to; without one it replays to
  /// the queue's endpoint.
  pub async fn enqueue(
    &self,
    queue: &str,
    target: Option<&Url>,
    payload: &serde_json::Value,
  ) -> Result<i64> {
    if !self.endpoints.contains_key(queue) {
      return Err(eyre!("Unknown queue: {}", queue));
    }
    let id = self.queue.append(queue, target, payload).await?;
    tracing::info!(queue, id, "mutation queued for replay");
    Ok(id)
  }

  pub async fn pending(&self, queue: &str) -> Result<Vec<QueueRecord>> {
    self.queue.list_all(queue).await
  }

  pub fn queues(&self) -> impl Iterator<Item = &str> {
    self.endpoints.keys().map(String::as_str)
  }

  /// Queue bound to the endpoint `url` is sent to, if any.
  pub fn queue_for_endpoint(&self, url: &Url) -> Option<&str> {
    self
      .endpoints
      .iter()
      .find(|(_, endpoint)| {
        endpoint.origin() == url.origin() && path_has_prefix(url.path(), endpoint.path())
      })
      .map(|(name, _)| name.as_str())
  }

  /// Reconnect signal: replay the queue bound to `tag`, or every queue for
  /// the catch-all tag. Unknown tags are ignored.
  pub async fn sync(&self, tag: &str) -> Result<Vec<ReplaySummary>> {
    if tag == self.config.sync_all_tag {
      let summaries = self
        .sync
        .replay_all()
        .await
        .into_iter()
        .filter_map(|result| match result {
          Ok(summary) => Some(summary),
          Err(e) => {
            tracing::warn!(error = %e, "queue replay failed");
            None
          }
        })
        .collect();
      return Ok(summaries);
    }

    match self.config.queue_for_tag(tag) {
      Some(queue) => Ok(vec![self.sync.replay(queue).await?]),
      None => {
        tracing::warn!(tag, "sync signal for unknown tag ignored");
        Ok(Vec::new())
      }
    }
  }

  pub fn push(&self, payload: Option<&[u8]>) -> Notification {
    Notification::from_push(payload, &self.config.app_name)
  }
}

/// The body as JSON, or as a JSON string when it is not JSON.
fn request_payload(request: &Request) -> serde_json::Value {
  let body = request.body.as_deref().unwrap_or_default();
  serde_json::from_slice(body)
    .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
  let prefix = prefix.trim_end_matches('/');
  path == prefix
    || path
      .strip_prefix(prefix)
      .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Response;
  use crate::network::testing::FakeNetwork;
  use crate::notify::Action;
  use reqwest::Method;
  use serde_json::json;

  const ORIGIN: &str = "http://localhost:5000";

  fn config() -> Config {
    Config {
      static_assets: vec!["/".to_string(), "/static/app.css".to_string()],
      ..Config::default()
    }
  }

  fn worker(network: FakeNetwork) -> Worker {
    worker_on(Database::open_in_memory().unwrap(), network)
  }

  fn worker_on(db: Database, network: FakeNetwork) -> Worker {
    Worker::new(
      config(),
      Arc::new(SqliteTierStore::new(db.clone())),
      Arc::new(SqliteQueueStore::new(db)),
      Arc::new(network),
    )
    .unwrap()
  }

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  fn online() -> FakeNetwork {
    let network = FakeNetwork::new();
    network.respond(&format!("{}/", ORIGIN), 200, "home");
    network.respond(&format!("{}/static/app.css", ORIGIN), 200, "body{}");
    network
  }

  #[tokio::test]
  async fn test_lifecycle_transitions() {
    let mut worker = worker(online());
    assert_eq!(worker.state(), LifecycleState::Installing);

    assert!(matches!(
      worker.handle(Event::Install).await.unwrap(),
      Reply::Installed { assets: 2 }
    ));
    assert_eq!(worker.state(), LifecycleState::Waiting);

    worker.handle(Event::Activate).await.unwrap();
    assert_eq!(worker.state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_installed_assets_served_offline() {
    let network = online();
    let mut worker = worker(network.clone());
    worker.ensure_active().await.unwrap();
    network.fail(&format!("{}/static/app.css", ORIGIN));

    let served = worker.fetch(&Request::get(url("/static/app.css"))).await;
    assert_eq!(served.source, Source::Cache);
    assert_eq!(served.response.text(), "body{}");
  }

  #[tokio::test]
  async fn test_failed_install_passes_through() {
    let mut worker = worker(FakeNetwork::new());
    worker.ensure_active().await.unwrap();
    assert_eq!(worker.state(), LifecycleState::Installing);

    let served = worker.fetch(&Request::get(url("/dashboard"))).await;
    assert_eq!(served.response.status, 503);
  }

  #[tokio::test]
  async fn test_failed_install_is_retried_on_next_start() {
    let db = Database::open_in_memory().unwrap();

    let mut first = worker_on(db.clone(), FakeNetwork::new());
    first.ensure_active().await.unwrap();
    assert_eq!(first.state(), LifecycleState::Installing);

    let network = online();
    let mut second = worker_on(db, network.clone());
    second.ensure_active().await.unwrap();
    assert_eq!(second.state(), LifecycleState::Active);
    assert_eq!(network.call_count(&format!("{}/static/app.css", ORIGIN)), 1);

    network.fail(&format!("{}/static/app.css", ORIGIN));
    let served = second.fetch(&Request::get(url("/static/app.css"))).await;
    assert_eq!(served.source, Source::Cache);
    assert_eq!(served.response.text(), "body{}");
  }

  #[tokio::test]
  async fn test_installed_store_is_not_refetched() {
    let db = Database::open_in_memory().unwrap();
    worker_on(db.clone(), online()).ensure_active().await.unwrap();

    let network = online();
    let mut restarted = worker_on(db, network.clone());
    restarted.ensure_active().await.unwrap();
    assert_eq!(restarted.state(), LifecycleState::Active);
    assert!(network.calls().is_empty());
  }

  #[tokio::test]
  async fn test_offline_mutation_is_queued_then_replayed() {
    let network = online();
    let mut worker = worker(network.clone());
    worker.ensure_active().await.unwrap();

    let request = Request::post_json(
      url("/add_fuel_record/3"),
      &json!({"liters": 42.5, "price": 5.89}),
    );
    let reply = worker.handle(Event::Fetch(request)).await.unwrap();
    let Reply::Served { served, queued } = reply else {
      panic!("expected a served reply");
    };
    assert_eq!(served.response.status, 503);
    assert!(queued.is_some());

    let pending = worker.pending("pending-fuel-records").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, json!({"liters": 42.5, "price": 5.89}));
    assert_eq!(pending[0].target, Some(url("/add_fuel_record/3")));

    network.respond(&format!("{}/add_fuel_record/3", ORIGIN), 200, "saved");
    let Reply::Synced(summaries) = worker
      .handle(Event::Sync {
        tag: "sync-fuel-records".to_string(),
      })
      .await
      .unwrap()
    else {
      panic!("expected a sync reply");
    };
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].replayed, 1);
    assert!(worker.pending("pending-fuel-records").await.unwrap().is_empty());

    let replayed = network.calls().into_iter().last().unwrap();
    assert_eq!(replayed.method, Method::POST);
    assert_eq!(replayed.url, url("/add_fuel_record/3"));
  }

  #[tokio::test]
  async fn test_successful_mutation_is_not_queued() {
    let network = online();
    network.respond(&format!("{}/oil_change_global", ORIGIN), 200, "ok");
    let worker = worker(network);

    let request = Request::post_json(url("/oil_change_global"), &json!({"km": 1}));
    let (served, queued) = worker.submit(&request).await.unwrap();
    assert_eq!(served.response.status, 200);
    assert_eq!(queued, None);
  }

  #[tokio::test]
  async fn test_unbound_mutation_is_not_queued() {
    let worker = worker(FakeNetwork::new());
    let request = Request {
      method: Method::DELETE,
      ..Request::get(url("/vehicles/3"))
    };

    let (served, queued) = worker.submit(&request).await.unwrap();
    assert_eq!(served.response.status, 503);
    assert_eq!(queued, None);
  }

  #[tokio::test]
  async fn test_unavailable_store_still_serves_offline() {
    let worker = Worker::new(
      config(),
      Arc::new(NoopTierStore),
      Arc::new(UnavailableQueueStore),
      Arc::new(FakeNetwork::new()),
    )
    .unwrap();

    let request = Request::post_json(url("/add_fuel_record"), &json!({"liters": 10}));
    let (served, queued) = worker.submit(&request).await.unwrap();
    assert_eq!(served.response.status, 503);
    assert_eq!(queued, None);
    assert!(worker.pending("pending-fuel-records").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_catch_all_tag_syncs_every_queue() {
    let network = FakeNetwork::new();
    network.respond_with(|_| Some(Response::new(200, "text/plain", "ok")));
    let worker = worker(network);
    worker.enqueue("pending-fuel-records", None, &json!({"a": 1})).await.unwrap();
    worker.enqueue("pending-oil-changes", None, &json!({"b": 2})).await.unwrap();

    let summaries = worker.sync("background-sync").await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.replayed == 1));
  }

  #[tokio::test]
  async fn test_unknown_tag_is_ignored() {
    let worker = worker(FakeNetwork::new());
    assert!(worker.sync("periodic-refresh").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_enqueue_unknown_queue_fails() {
    let worker = worker(FakeNetwork::new());
    assert!(worker.enqueue("pending-tires", None, &json!({})).await.is_err());
  }

  #[test]
  fn test_queue_for_endpoint_matches_path_segments() {
    let worker = worker(FakeNetwork::new());
    assert_eq!(
      worker.queue_for_endpoint(&url("/add_fuel_record")),
      Some("pending-fuel-records")
    );
    assert_eq!(
      worker.queue_for_endpoint(&url("/add_fuel_record/7")),
      Some("pending-fuel-records")
    );
    assert_eq!(worker.queue_for_endpoint(&url("/add_fuel_records")), None);
    assert_eq!(
      worker.queue_for_endpoint(&Url::parse("http://example.com/oil_change_global").unwrap()),
      None
    );
  }

  #[test]
  fn test_form_body_is_queued_as_string() {
    let request = Request {
      method: Method::POST,
      body: Some(b"liters=40&price=5.5".to_vec()),
      ..Request::get(url("/add_fuel_record/1"))
    };
    assert_eq!(request_payload(&request), json!("liters=40&price=5.5"));
  }

  #[tokio::test]
  async fn test_push_and_click() {
    let mut worker = worker(FakeNetwork::new());
    let Reply::Notify(notification) = worker
      .handle(Event::Push {
        payload: Some(b"Hora de abastecer".to_vec()),
      })
      .await
      .unwrap()
    else {
      panic!("expected a notification");
    };
    assert_eq!(notification.body, "Hora de abastecer");

    let reply = worker
      .handle(Event::NotificationClick {
        notification,
        action: Some(Action::View),
      })
      .await
      .unwrap();
    assert!(matches!(reply, Reply::Navigate(target) if target == "/dashboard"));
  }
}
