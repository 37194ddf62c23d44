//! Store trait and stored-entry types.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::resource::{ResourceKey, ResponseSnapshot};

/// A stored response plus bookkeeping.
#[derive(Debug, Clone)]
pub struct StoredResponse {
  pub snapshot: ResponseSnapshot,
  pub cached_at: DateTime<Utc>,
}

/// Durable key→response mapping partitioned into named generations.
///
/// These five operations are everything the cache needs from persistent
/// storage.
pub trait Store: Send + Sync {
  /// Create a generation if it does not already exist.
  fn open(&self, generation: &str) -> Result<()>;

  /// Look up an entry within a generation.
  fn get(&self, generation: &str, key: &ResourceKey) -> Result<Option<StoredResponse>>;

  /// Insert or replace an entry (last-write-wins within the generation).
  fn put(&self, generation: &str, key: &ResourceKey, snapshot: &ResponseSnapshot) -> Result<()>;

  /// List every live generation.
  fn generations(&self) -> Result<Vec<String>>;

  /// Drop a generation and all of its entries.
  fn delete(&self, generation: &str) -> Result<()>;
}
