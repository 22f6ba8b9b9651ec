//! The only part of the pipeline that talks to the indexing service.

mod elasticsearch;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;

pub use self::elasticsearch::ElasticsearchGateway;
pub use self::memory::{GatewayCall, MemoryGateway};

/// A document paired with the id it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    pub id: String,
    pub body: Value,
}

/// Writes against a remote document index. Every transport or service failure
/// is returned to the caller.
#[async_trait]
pub trait IndexGateway: Send + Sync {
    /// Create or overwrite a single document.
    async fn upsert_one(&self, index: &str, id: &str, document: Value) -> SyncResult<()>;

    /// Create or overwrite many documents in one request.
    async fn bulk_upsert(&self, index: &str, documents: Vec<BulkDocument>) -> SyncResult<()>;

    /// Delete every document whose `field` equals `value`; returns how many went.
    async fn delete_by_filter(&self, index: &str, field: &str, value: Value) -> SyncResult<u64>;

    /// Create the index with `schema` unless it already exists.
    async fn ensure_index_schema(&self, index: &str, schema: Value) -> SyncResult<()>;

    /// Returns `false` if there was no such index.
    async fn drop_index(&self, index: &str) -> SyncResult<bool>;
}
