//! Storage seam: documents per entity type, queried with `Query` predicates.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, store_schema, PgStore};

use crate::error::StoreError;
use crate::query::Query;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Documents of `entity_type` matching the query, in query order.
    async fn query(&self, entity_type: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    async fn find(&self, entity_type: &str, identifier: &str) -> Result<Option<Value>, StoreError>;

    /// Fails with `StoreError::Conflict` when the identifier is taken.
    async fn add(&self, entity_type: &str, identifier: &str, document: Value) -> Result<(), StoreError>;

    /// All or nothing: a single conflict aborts the whole batch.
    async fn add_all(&self, entity_type: &str, documents: Vec<(String, Value)>) -> Result<(), StoreError>;

    /// Returns false when nothing was stored under `identifier`.
    async fn update(&self, entity_type: &str, identifier: &str, document: Value) -> Result<bool, StoreError>;

    async fn remove(&self, entity_type: &str, identifier: &str) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
