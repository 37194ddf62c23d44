//! Versioned key→response store.
//!
//! The store is partitioned into named generations; exactly one generation is
//! current at any time and the lifecycle controller deletes the rest during
//! activation. Writes within a generation are last-write-wins, and entries
//! are only ever dropped wholesale with their generation.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, StoredResponse};
