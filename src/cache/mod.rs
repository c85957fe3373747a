//! Caching subsystem.
//!
//! - [`table::CacheTable`]: the in-memory key → vector table, ordered by
//!   recency of upsert.
//! - [`schema::SchemaValidator`]: checks the column layout of the table, of
//!   incoming batches, and of persisted files.
//! - [`eviction`]: LRU and LFU size bounding.
//! - [`backend`]: Parquet and JSON persistence.
//! - [`store::EmbeddingStore`]: batch retrieval on top of all of the above.

pub mod backend;
pub mod eviction;
pub mod schema;
pub mod store;
pub mod table;

#[cfg(feature = "parquet")]
pub use backend::ParquetBackend;
pub use backend::{JsonBackend, TableBackend};
pub use eviction::{Eviction, EvictionPolicy};
pub use schema::{SchemaValidator, TableSchema};
pub use store::{EmbeddingStore, EmbeddingStoreBuilder};
pub use table::{CacheEntry, CacheTable, EntryBatch, EntryRef, LookupRow};
