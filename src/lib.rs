//! Embestore - persistent embedding cache
//!
//! Computing text embeddings is expensive. This crate keeps a table of
//! `key → vector` pairs in front of any [`EmbeddingProvider`], sends only
//! unseen keys to the provider, and persists the table to a Parquet (or
//! JSON) file so it survives restarts. Optionally the table is bounded by
//! an LRU or LFU eviction policy.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use embestore::{EmbeddingProvider, EmbeddingStore, EvictionPolicy};
//!
//! struct MyEncoder;
//!
//! #[async_trait]
//! impl EmbeddingProvider for MyEncoder {
//!     fn name(&self) -> &str {
//!         "my-encoder"
//!     }
//!
//!     async fn embed(&self, texts: &[&str]) -> embestore::Result<Vec<Vec<f32>>> {
//!         Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> embestore::Result<()> {
//!     let mut store = EmbeddingStore::builder(Arc::new(MyEncoder))
//!         .capacity(1_000)
//!         .eviction_policy(EvictionPolicy::Lfu)
//!         .persistence_path("embeddings.parquet")
//!         .build()?;
//!
//!     let rows = store.retrieve(&["hello", "world", "hello"]).await?;
//!     assert_eq!(rows.len(), 3);
//!
//!     store.save(None)?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `parquet` (default): Parquet persistence via `arrow`/`parquet`.
//! - `cli`: the `embestore` binary for inspecting and compacting files.

pub mod cache;
pub mod config;
pub mod error;
pub mod providers;
pub mod telemetry;

pub use error::{EmbestoreError, Result, SchemaError};

pub use cache::{
    CacheEntry, CacheTable, EmbeddingStore, EmbeddingStoreBuilder, EntryRef, Eviction,
    EvictionPolicy, JsonBackend, LookupRow, SchemaValidator, TableBackend, TableSchema,
};
#[cfg(feature = "parquet")]
pub use cache::ParquetBackend;
pub use config::{BackendKind, FileConfig, StoreConfig};
pub use providers::{ChunkedProvider, EmbeddingProvider};
