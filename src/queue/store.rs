//! Durable queue store for offline mutations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::Serialize;
use url::Url;

use crate::db::{parse_datetime, Database};

/// A pending mutation waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRecord {
  /// Assigned at enqueue time; the delete key
  pub id: i64,
  pub queue: String,
  /// Where the mutation was originally sent; `None` replays to the queue's
  /// endpoint
  pub target: Option<Url>,
  /// Forwarded verbatim on replay
  pub payload: serde_json::Value,
  pub enqueued_at: DateTime<Utc>,
}

/// Trait for queue backends.
#[async_trait]
pub trait QueueStore: Send + Sync {
  /// Persist a record and return its id.
  async fn append(
    &self,
    queue: &str,
    target: Option<&Url>,
    payload: &serde_json::Value,
  ) -> Result<i64>;

  /// Every record of `queue` in enumeration (id) order.
  async fn list_all(&self, queue: &str) -> Result<Vec<QueueRecord>>;

  /// Remove a record. Deleting a missing record is not an error.
  async fn delete(&self, queue: &str, id: i64) -> Result<()>;
}

/// Stand-in used when no durable storage exists.
///
/// Reads as permanently empty so replay is a no-op. Appends fail, since the
/// caller has to know its mutation was not persisted.
pub struct UnavailableQueueStore;

#[async_trait]
impl QueueStore for UnavailableQueueStore {
  async fn append(
    &self,
    queue: &str,
    _target: Option<&Url>,
    _payload: &serde_json::Value,
  ) -> Result<i64> {
    Err(eyre!(
      "Cannot queue record for {}: durable storage is unavailable",
      queue
    ))
  }

  async fn list_all(&self, _queue: &str) -> Result<Vec<QueueRecord>> {
    Ok(Vec::new())
  }

  async fn delete(&self, _queue: &str, _id: i64) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based queue store.
#[derive(Clone)]
pub struct SqliteQueueStore {
  db: Database,
}

impl SqliteQueueStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
  async fn append(
    &self,
    queue: &str,
    target: Option<&Url>,
    payload: &serde_json::Value,
  ) -> Result<i64> {
    let queue = queue.to_string();
    let target = target.map(Url::to_string);
    let payload = payload.to_string();
    self
      .db
      .call(move |conn| {
        conn
          .execute(
            "INSERT INTO queue_records (queue, target, payload, enqueued_at)
             VALUES (?, ?, ?, datetime('now'))",
            params![queue, target, payload],
          )
          .map_err(|e| eyre!("Failed to queue record for {}: {}", queue, e))?;
        Ok(conn.last_insert_rowid())
      })
      .await
  }

  async fn list_all(&self, queue: &str) -> Result<Vec<QueueRecord>> {
    let queue = queue.to_string();
    self
      .db
      .call(move |conn| {
        let mut stmt = conn
          .prepare(
            "SELECT id, target, payload, enqueued_at FROM queue_records
             WHERE queue = ?
             ORDER BY id",
          )
          .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

        let rows: Vec<(i64, Option<String>, String, String)> = stmt
          .query_map(params![queue], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
          })
          .map_err(|e| eyre!("Failed to list queue {}: {}", queue, e))?
          .collect::<std::result::Result<_, _>>()
          .map_err(|e| eyre!("Failed to list queue {}: {}", queue, e))?;

        rows
          .into_iter()
          .map(|(id, target, payload, enqueued_at)| -> Result<QueueRecord> {
            let target = target
              .map(|t| Url::parse(&t))
              .transpose()
              .map_err(|e| eyre!("Invalid target for record {}: {}", id, e))?;
            Ok(QueueRecord {
              id,
              queue: queue.clone(),
              target,
              payload: serde_json::from_str(&payload)
                .map_err(|e| eyre!("Failed to deserialize record {}: {}", id, e))?,
              enqueued_at: parse_datetime(&enqueued_at)?,
            })
          })
          .collect()
      })
      .await
  }

  async fn delete(&self, queue: &str, id: i64) -> Result<()> {
    let queue = queue.to_string();
    self
      .db
      .call(move |conn| {
        conn
          .execute(
            "DELETE FROM queue_records WHERE queue = ? AND id = ?",
            params![queue, id],
          )
          .map_err(|e| eyre!("Failed to delete record {} from {}: {}", id, queue, e))?;
        Ok(())
      })
      .await
  }
}
