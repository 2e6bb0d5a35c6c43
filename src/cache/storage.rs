//! Tier storage trait and SQLite implementation.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;

use super::traits::{CachedEntry, RequestKey};
use crate::db::{parse_datetime, Database};
use crate::http::Response;

/// Trait for cache tier backends.
///
/// Every mutation is a single atomic statement or transaction.
#[async_trait]
pub trait TierStore: Send + Sync {
  /// Create the tier if it does not exist.
  async fn open(&self, tier: &str) -> Result<()>;

  /// Look up a cached response.
  async fn get(&self, tier: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Insert or replace an entry, creating the tier on demand.
  async fn put(&self, tier: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Names of every existing tier.
  async fn tier_names(&self) -> Result<BTreeSet<String>>;

  /// Drop a tier and all of its entries. Returns whether it existed.
  async fn delete_tier(&self, tier: &str) -> Result<bool>;
}

/// Storage implementation that doesn't cache anything.
/// Used when no durable storage is available - every lookup misses.
pub struct NoopTierStore;

#[async_trait]
impl TierStore for NoopTierStore {
  async fn open(&self, _tier: &str) -> Result<()> {
    Ok(())
  }

  async fn get(&self, _tier: &str, _key: &RequestKey) -> Result<Option<CachedEntry>> {
    Ok(None) // Always miss
  }

  async fn put(&self, _tier: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  async fn tier_names(&self) -> Result<BTreeSet<String>> {
    Ok(BTreeSet::new())
  }

  async fn delete_tier(&self, _tier: &str) -> Result<bool> {
    Ok(false)
  }
}

/// SQLite-based tier storage.
#[derive(Clone)]
pub struct SqliteTierStore {
  db: Database,
}

impl SqliteTierStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

#[async_trait]
impl TierStore for SqliteTierStore {
  async fn open(&self, tier: &str) -> Result<()> {
    let tier = tier.to_string();
    self
      .db
      .call(move |conn| {
        conn
          .execute(
            "INSERT OR IGNORE INTO cache_tiers (name) VALUES (?)",
            params![tier],
          )
          .map_err(|e| eyre!("Failed to open tier {}: {}", tier, e))?;
        Ok(())
      })
      .await
  }

  async fn get(&self, tier: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let tier = tier.to_string();
    let hash = key.cache_hash();
    self
      .db
      .call(move |conn| {
        let row: Option<(String, u16, String, Vec<u8>, String)> = conn
          .query_row(
            "SELECT url, status, headers, body, cached_at FROM cache_entries
             WHERE tier = ? AND request_hash = ?",
            params![tier, hash],
            |row| {
              Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
              ))
            },
          )
          .optional()
          .map_err(|e| eyre!("Failed to read tier {}: {}", tier, e))?;

        match row {
          Some((url, status, headers, body, cached_at)) => {
            let headers: Vec<(String, String)> = serde_json::from_str(&headers)
              .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
            Ok(Some(CachedEntry {
              url,
              response: Response {
                status,
                headers,
                body,
              },
              cached_at: parse_datetime(&cached_at)?,
            }))
          }
          None => Ok(None),
        }
      })
      .await
  }

  async fn put(&self, tier: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let tier = tier.to_string();
    let hash = key.cache_hash();
    let request_key = key.to_string();
    let url = request_key
      .strip_prefix("GET ")
      .unwrap_or(&request_key)
      .to_string();
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let status = response.status;
    let body = response.body.clone();

    self
      .db
      .call(move |conn| {
        let tx = conn
          .transaction()
          .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

        tx.execute(
          "INSERT OR IGNORE INTO cache_tiers (name) VALUES (?)",
          params![tier],
        )
        .map_err(|e| eyre!("Failed to open tier {}: {}", tier, e))?;

        tx.execute(
          "INSERT OR REPLACE INTO cache_entries
             (tier, request_hash, request_key, url, status, headers, body, cached_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
          params![tier, hash, request_key, url, status, headers, body],
        )
        .map_err(|e| eyre!("Failed to store entry in {}: {}", tier, e))?;

        tx.commit()
          .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
        Ok(())
      })
      .await
  }

  async fn tier_names(&self) -> Result<BTreeSet<String>> {
    self
      .db
      .call(|conn| {
        let mut stmt = conn
          .prepare("SELECT name FROM cache_tiers")
          .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

        let names = stmt
          .query_map([], |row| row.get::<_, String>(0))
          .map_err(|e| eyre!("Failed to list tiers: {}", e))?
          .collect::<std::result::Result<BTreeSet<_>, _>>()
          .map_err(|e| eyre!("Failed to list tiers: {}", e))?;
        Ok(names)
      })
      .await
  }

  async fn delete_tier(&self, tier: &str) -> Result<bool> {
    let tier = tier.to_string();
    self
      .db
      .call(move |conn| {
        let tx = conn
          .transaction()
          .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

        tx.execute("DELETE FROM cache_entries WHERE tier = ?", params![tier])
          .map_err(|e| eyre!("Failed to delete entries of {}: {}", tier, e))?;
        let removed = tx
          .execute("DELETE FROM cache_tiers WHERE name = ?", params![tier])
          .map_err(|e| eyre!("Failed to delete tier {}: {}", tier, e))?;

        tx.commit()
          .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
        Ok(removed > 0)
      })
      .await
  }
}
