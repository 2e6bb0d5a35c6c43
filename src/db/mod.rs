pub mod schema;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared SQLite connection backing the tier and queue stores.
///
/// Statements run on the blocking pool so the event loop never waits on disk.
#[derive(Clone)]
pub struct Database {
  conn: Arc<Mutex<Connection>>,
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Private in-memory database
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    add_queue_target(&conn)?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Run `f` against the connection on the blocking pool.
  pub async fn call<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
      f(&mut *conn)
    })
    .await
    .map_err(|e| eyre!("Database task failed: {}", e))?
  }
}

/// Stores created before records kept their request URL lack the column.
fn add_queue_target(conn: &Connection) -> Result<()> {
  let has_target = conn
    .prepare("SELECT 1 FROM pragma_table_info('queue_records') WHERE name = 'target'")
    .and_then(|mut stmt| stmt.exists([]))
    .map_err(|e| eyre!("Failed to inspect queue_records: {}", e))?;

  if !has_target {
    conn
      .execute_batch("ALTER TABLE queue_records ADD COLUMN target TEXT")
      .map_err(|e| eyre!("Failed to add queue_records.target: {}", e))?;
  }
  Ok(())
}

/// Parse a datetime string from SQLite format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    db.call(|conn| {
      conn.execute_batch(schema::SCHEMA)?;
      Ok(())
    })
    .await
    .unwrap();
  }

  #[tokio::test]
  async fn test_old_queue_table_gains_target_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch(
        "CREATE TABLE queue_records (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           queue TEXT NOT NULL,
           payload TEXT NOT NULL,
           enqueued_at TEXT NOT NULL DEFAULT (datetime('now'))
         );
         INSERT INTO queue_records (queue, payload) VALUES ('pending-oil-changes', '{}');",
      )
      .unwrap();

    let db = Database::with_connection(conn).unwrap();
    let target: Option<String> = db
      .call(|conn| {
        Ok(conn.query_row("SELECT target FROM queue_records", [], |row| row.get(0))?)
      })
      .await
      .unwrap();
    assert_eq!(target, None);
  }

  #[test]
  fn test_parse_sqlite_datetime() {
    let dt = parse_datetime("2025-08-12 07:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2025-08-12T07:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
