//! In-memory store for tests and hosts without durable storage.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};

use super::traits::{Store, StoredResponse};
use crate::resource::{ResourceKey, ResponseSnapshot};

/// HashMap-backed store with the same generation semantics as [`SqliteStore`].
///
/// [`SqliteStore`]: super::SqliteStore
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
  generations: BTreeSet<String>,
  entries: BTreeMap<(String, String), StoredResponse>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of entries in a generation.
  pub fn entry_count(&self, generation: &str) -> Result<usize> {
    let inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      inner
        .entries
        .keys()
        .filter(|(g, _)| g == generation)
        .count(),
    )
  }
}

impl Store for MemoryStore {
  fn open(&self, generation: &str) -> Result<()> {
    let mut inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    inner.generations.insert(generation.to_string());
    Ok(())
  }

  fn get(&self, generation: &str, key: &ResourceKey) -> Result<Option<StoredResponse>> {
    let inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      inner
        .entries
        .get(&(generation.to_string(), key.store_hash()))
        .cloned(),
    )
  }

  fn put(&self, generation: &str, key: &ResourceKey, snapshot: &ResponseSnapshot) -> Result<()> {
    let mut inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    inner.generations.insert(generation.to_string());
    inner.entries.insert(
      (generation.to_string(), key.store_hash()),
      StoredResponse {
        snapshot: snapshot.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn generations(&self) -> Result<Vec<String>> {
    let inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(inner.generations.iter().cloned().collect())
  }

  fn delete(&self, generation: &str) -> Result<()> {
    let mut inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    inner.generations.remove(generation);
    inner.entries.retain(|(g, _), _| g != generation);
    Ok(())
  }
}
