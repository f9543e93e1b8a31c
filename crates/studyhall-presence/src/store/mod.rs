//! The tabular store holding presence rows.
//!
//! `PresenceStore` is the only write path the tracker uses. Two backends:
//! PostgREST over HTTP (`RestStore`) and an in-process map (`MemoryStore`).

mod error;
mod memory;
mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::record::PresenceRecord;

pub use error::StoreError;
pub use memory::{MemoryStore, StoreStats};
pub use rest::{build_http_client, RestStore};

/// The four columns every presence row carries.
pub const PRESENCE_COLUMNS: &str = "id,email,full_name,last_seen";

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Insert or replace the row keyed by `record.id`.
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), StoreError>;

    /// Set `last_seen` on an existing row. Returns `false` when no row matched.
    async fn touch(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Delete the row keyed by `id`. Deleting a missing row is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Delete every row with `last_seen < cutoff`. Returns the number removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// All rows, newest `last_seen` first.
    async fn select_all(&self) -> Result<Vec<PresenceRecord>, StoreError>;

    /// Read at most one row selecting `columns`, to check access and shape.
    async fn probe(&self, columns: &str) -> Result<(), StoreError>;
}
