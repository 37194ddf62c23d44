//! SQLite-backed store implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{Store, StoredResponse};
use crate::resource::{ResourceKey, ResponseSnapshot};

/// SQLite-based versioned store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the versioned store. Entries cascade away with their
/// generation.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, key_hash),
    FOREIGN KEY (generation) REFERENCES generations(name) ON DELETE CASCADE
);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// Fully in-memory store, used in tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .pragma_update(None, "foreign_keys", true)
      .map_err(|e| eyre!("Failed to enable foreign keys: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellcache").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

impl Store for SqliteStore {
  fn open(&self, generation: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", generation, e))?;

    Ok(())
  }

  fn get(&self, generation: &str, key: &ResourceKey) -> Result<Option<StoredResponse>> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE generation = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare lookup: {}", e))?;

    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![generation, key.store_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.url(), e))?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers: BTreeMap<String, String> = serde_json::from_slice(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

        Ok(Some(StoredResponse {
          snapshot: ResponseSnapshot {
            status,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, key: &ResourceKey, snapshot: &ResponseSnapshot) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_vec(&snapshot.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to ensure generation {}: {}", generation, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (generation, key_hash, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          key.store_hash(),
          key.url().as_str(),
          snapshot.status,
          headers,
          snapshot.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key.url(), e))?;

    Ok(())
  }

  fn generations(&self) -> Result<Vec<String>> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare generation listing: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<std::result::Result<Vec<String>, _>>()
      .map_err(|e| eyre!("Failed to read generation row: {}", e))?;

    Ok(names)
  }

  fn delete(&self, generation: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM generations WHERE name = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete generation {}: {}", generation, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot(body: &str) -> ResponseSnapshot {
    ResponseSnapshot::new(200)
      .with_header("content-type", "text/plain")
      .with_body(body)
  }

  #[test]
  fn test_put_get_round_trip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = ResourceKey::get("https://example.org/index.html").unwrap();

    store.open("app-v1").unwrap();
    store.put("app-v1", &key, &snapshot("shell")).unwrap();

    let stored = store.get("app-v1", &key).unwrap().unwrap();
    assert_eq!(stored.snapshot, snapshot("shell"));
  }

  #[test]
  fn test_last_write_wins() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = ResourceKey::get("https://example.org/news.json").unwrap();

    store.put("app-v1", &key, &snapshot("old")).unwrap();
    store.put("app-v1", &key, &snapshot("new")).unwrap();

    let stored = store.get("app-v1", &key).unwrap().unwrap();
    assert_eq!(stored.snapshot.body, b"new");
  }

  #[test]
  fn test_idempotent_write_leaves_single_entry() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = ResourceKey::get("https://example.org/news.json").unwrap();

    store.put("app-v1", &key, &snapshot("same")).unwrap();
    store.put("app-v1", &key, &snapshot("same")).unwrap();

    let stored = store.get("app-v1", &key).unwrap().unwrap();
    assert_eq!(stored.snapshot.body, b"same");
    assert_eq!(store.generations().unwrap(), vec!["app-v1".to_string()]);
  }

  #[test]
  fn test_generations_are_isolated() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = ResourceKey::get("https://example.org/index.html").unwrap();

    store.put("app-v1", &key, &snapshot("v1")).unwrap();
    store.open("app-v2").unwrap();

    assert!(store.get("app-v2", &key).unwrap().is_none());
  }

  #[test]
  fn test_delete_drops_generation_and_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = ResourceKey::get("https://example.org/index.html").unwrap();

    store.put("app-v1", &key, &snapshot("v1")).unwrap();
    store.put("app-v2", &key, &snapshot("v2")).unwrap();

    store.delete("app-v1").unwrap();

    assert_eq!(store.generations().unwrap(), vec!["app-v2".to_string()]);
    assert!(store.get("app-v1", &key).unwrap().is_none());
    assert!(store.get("app-v2", &key).unwrap().is_some());
  }

  #[test]
  fn test_delete_missing_generation_is_ok() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.delete("never-existed").unwrap();
  }
}
