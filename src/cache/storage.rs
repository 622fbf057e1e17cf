//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use url::Url;

use super::key::RequestKey;
use crate::net::{Response, ResponseType};

/// A stored request/response pair.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// When the entry was stored
  pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
  /// Rebuild the response. Only basic responses are ever stored.
  pub fn to_response(&self) -> Result<Response> {
    let url =
      Url::parse(&self.url).map_err(|e| eyre!("Invalid cached URL '{}': {}", self.url, e))?;
    Ok(Response {
      url,
      status: self.status,
      response_type: ResponseType::Basic,
      headers: self.headers.clone(),
      body: self.body.clone(),
    })
  }
}

/// Summary of one cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
  pub name: String,
  pub entries: usize,
}

/// Trait for cache storage backends.
///
/// A generation is a named bucket of entries; writes to different keys
/// never conflict.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the generation if it does not exist.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// All generations, ordered by name.
  fn generations(&self) -> Result<Vec<GenerationInfo>>;

  /// Delete a generation and its entries. Returns false if it did not exist.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Look up a request in a generation.
  fn match_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a response, replacing any previous entry for the key. The
  /// generation must already be open.
  fn put_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Private in-memory database, discarded on drop (`--ephemeral`).
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);
"#;

impl CacheStorage for SqliteStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache generation {}: {}", name, e))?;

    Ok(())
  }

  fn generations(&self) -> Result<Vec<GenerationInfo>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT g.name, COUNT(e.request_key) FROM cache_generations g
         LEFT JOIN cache_entries e ON e.generation = g.name
         GROUP BY g.name
         ORDER BY g.name",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let generations = stmt
      .query_map([], |row| {
        Ok(GenerationInfo {
          name: row.get(0)?,
          entries: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache generation: {}", e))?;

    Ok(generations)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![name],
      )
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT url, status, headers, body, cached_at FROM cache_entries
         WHERE generation = ? AND request_key = ?",
        params![generation, key.cache_hash()],
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
      .map_err(|e| eyre!("Failed to look up {}: {}", key.url, e))?;

    match row {
      Some((url, status, headers, body, cached_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;
        Ok(Some(CachedEntry {
          url,
          status,
          headers,
          body,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // A deleted generation must stay deleted, even for late writers
    let exists: bool = tx
      .query_row(
        "SELECT EXISTS(SELECT 1 FROM cache_generations WHERE name = ?)",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to look up cache generation {}: {}", generation, e))?;
    if !exists {
      return Err(eyre!("Cache generation {} does not exist", generation));
    }

    tx.execute(
      "INSERT OR REPLACE INTO cache_entries
         (generation, request_key, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        key.cache_hash(),
        key.method,
        key.url,
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key.url, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

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
