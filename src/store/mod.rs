//! Document store abstraction.
//!
//! The HTTP handlers and the index bootstrap only talk to [`DocumentStore`], so the
//! Elasticsearch adapter can be swapped for [`MemoryStore`] in tests and local runs.

mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::query::GeoDistanceQuery;

pub use memory::MemoryStore;

/// Raw result of a search round trip.
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    /// Hit `_source` documents in the order the store returned them
    pub documents: Vec<Value>,
    pub took_ms: u64,
    pub total_hits: u64,
}

/// Index lifecycle, writes and geo-distance search against an external store.
///
/// Every call is a separate round trip; implementations do not cache or batch.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether `index` exists.
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// Create `index` with an explicit mapping.
    ///
    /// Fails with [`StoreError::IndexCreation`] if the mapping is rejected or the
    /// index appeared concurrently.
    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError>;

    /// Write `document` under `id`, replacing any previous version.
    ///
    /// With `refresh` set the document is searchable as soon as this returns.
    async fn upsert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<(), StoreError>;

    /// Run a geo-distance search.
    async fn search(&self, index: &str, query: &GeoDistanceQuery)
        -> Result<SearchHits, StoreError>;

    /// Whether the store reports itself healthy.
    async fn health_check(&self) -> Result<bool, StoreError>;
}
