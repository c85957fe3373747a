//! The embedding store: batch retrieval on top of the cache table.
//!
//! # Retrieval
//!
//! [`EmbeddingStore::retrieve`] handles one batch of keys:
//!
//! 1. deduplicate keys, first-seen order
//! 2. look them up; partition into hits and misses
//! 3. send only the misses to the provider (no call when there are none)
//! 4. merge the provider's vectors back into the miss rows by position
//! 5. bump `usage_count` of every deduplicated key by one
//! 6. upsert the whole deduplicated batch
//! 7. run the eviction policy
//! 8. re-expand the rows to the original key list, duplicates included
//!
//! Every check that can fail (provider call, vector count, layout
//! validation) happens before step 6, so a failed retrieval leaves the
//! store untouched.
//!
//! # Persistence
//!
//! The table is loaded once at construction and written only by
//! [`EmbeddingStore::save`]. Retrieval never touches the disk.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::backend::{self, TableBackend};
use super::eviction::{Eviction, EvictionPolicy};
use super::schema::{SchemaValidator, TableSchema};
use super::table::{CacheEntry, CacheTable, EntryBatch, EntryRef, LookupRow};
use crate::config::{BackendKind, StoreConfig};
use crate::providers::EmbeddingProvider;
use crate::telemetry;
use crate::{EmbestoreError, Result};

/// Persistent text → embedding cache in front of an [`EmbeddingProvider`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use embestore::{EmbeddingProvider, EmbeddingStore, EvictionPolicy};
/// # async fn example(provider: Arc<dyn EmbeddingProvider>) -> embestore::Result<()> {
/// let mut store = EmbeddingStore::builder(provider)
///     .capacity(10_000)
///     .eviction_policy(EvictionPolicy::Lru)
///     .persistence_path("sentences.parquet")
///     .build()?;
///
/// let vectors = store
///     .retrieve_embeddings(&["I want some dinner", "Bella Ciao"])
///     .await?;
/// assert_eq!(vectors.len(), 2);
///
/// store.save(None)?;
/// # Ok(())
/// # }
/// ```
pub struct EmbeddingStore {
    provider: Arc<dyn EmbeddingProvider>,
    table: CacheTable,
    validator: SchemaValidator,
    eviction: Option<Eviction>,
    config: StoreConfig,
    backend: Box<dyn TableBackend>,
}

impl fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("provider", &self.provider.name())
            .field("backend", &self.backend.name())
            .field("entries", &self.table.len())
            .field("eviction", &self.eviction)
            .field("persistence_path", &self.config.persistence_path)
            .finish()
    }
}

impl EmbeddingStore {
    /// Create a builder for a store backed by `provider`.
    pub fn builder(provider: Arc<dyn EmbeddingProvider>) -> EmbeddingStoreBuilder {
        EmbeddingStoreBuilder::new(provider)
    }

    /// Build a store from a [`StoreConfig`].
    ///
    /// Loads the table from `persistence_path` if a file exists there;
    /// otherwise starts empty without creating the file.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: StoreConfig) -> Result<Self> {
        Self::builder(provider).config(config).build()
    }

    /// Open an unbounded store persisted at `path`.
    ///
    /// If no file exists yet, an empty table is written immediately so the
    /// file exists from then on.
    pub fn open(provider: Arc<dyn EmbeddingProvider>, path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(provider)
            .persistence_path(path)
            .persist_if_missing(true)
            .build()
    }

    /// Retrieve one row per requested key, in request order.
    ///
    /// Repeated keys yield identical rows. Only keys missing from the cache
    /// are sent to the provider. On error the store is left unchanged.
    pub async fn retrieve(&mut self, keys: &[&str]) -> Result<Vec<CacheEntry>> {
        let unique = dedup_keys(keys);
        let rows = self.table.lookup(&unique);

        let misses: Vec<&str> = rows
            .iter()
            .filter(|row| !row.is_hit())
            .map(|row| row.key.as_str())
            .collect();
        let hits = unique.len() - misses.len();
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(hits as u64);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(misses.len() as u64);
        debug!(
            requested = keys.len(),
            unique = unique.len(),
            hits,
            misses = misses.len(),
            "retrieving embeddings"
        );

        let fresh = self.embed_misses(&misses).await?;
        let entries = merge_rows(rows, fresh)?;

        let position: HashMap<&str, usize> = unique
            .iter()
            .enumerate()
            .map(|(i, key)| (*key, i))
            .collect();
        let expanded = keys
            .iter()
            .map(|key| entries[position[key]].clone())
            .collect();

        let batch = EntryBatch::new(self.table.schema(), entries);
        self.validator.validate_table(&self.table)?;
        self.validator.validate_batch(&batch)?;
        self.table.upsert(batch.into_entries());

        if let Some(eviction) = &self.eviction {
            eviction.apply(&mut self.table);
        }
        metrics::gauge!(telemetry::ENTRIES).set(self.table.len() as f64);

        Ok(expanded)
    }

    /// Like [`retrieve`](Self::retrieve), returning only the vectors.
    pub async fn retrieve_embeddings(&mut self, keys: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(self
            .retrieve(keys)
            .await?
            .into_iter()
            .map(|entry| entry.vector)
            .collect())
    }

    /// Left-outer lookup without calling the provider or touching usage.
    pub fn lookup(&self, keys: &[&str]) -> Vec<LookupRow> {
        self.table.lookup(keys)
    }

    /// Vectors of the requested keys that are cached, in store order.
    ///
    /// Returns `None` when none of the keys are cached. Does not call the
    /// provider, bump usage, or change recency.
    pub fn cached_embeddings(&self, keys: &[&str]) -> Option<Vec<Vec<f32>>> {
        let wanted: HashSet<&str> = keys.iter().copied().collect();
        let vectors: Vec<Vec<f32>> = self
            .table
            .entries()
            .filter(|entry| wanted.contains(entry.key))
            .map(|entry| entry.vector.to_vec())
            .collect();
        if vectors.is_empty() {
            None
        } else {
            Some(vectors)
        }
    }

    /// Persist the table to `path`, or to the configured persistence path.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path
            .or(self.config.persistence_path.as_deref())
            .ok_or_else(|| {
                EmbestoreError::Configuration(
                    "no path given and no persistence_path configured".to_string(),
                )
            })?;
        self.backend.save(&self.table, path)?;
        info!(
            backend = self.backend.name(),
            path = %path.display(),
            entries = self.table.len(),
            "saved embedding cache"
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains(key)
    }

    /// Iterate entries from least to most recently upserted.
    pub fn entries(&self) -> impl Iterator<Item = EntryRef<'_>> + '_ {
        self.table.entries()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> TableSchema {
        self.table.schema()
    }

    pub fn eviction(&self) -> Option<Eviction> {
        self.eviction
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn embed_misses(&self, misses: &[&str]) -> Result<Vec<Vec<f32>>> {
        if misses.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.provider.embed(misses).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::PROVIDER_REQUESTS_TOTAL, "status" => status).increment(1);

        let vectors = result.map_err(into_provider_error)?;
        if vectors.len() != misses.len() {
            warn!(
                provider = self.provider.name(),
                expected = misses.len(),
                returned = vectors.len(),
                "provider returned wrong number of vectors"
            );
            return Err(EmbestoreError::ProviderContract {
                expected: misses.len(),
                returned: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

/// Builder for [`EmbeddingStore`].
pub struct EmbeddingStoreBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    config: StoreConfig,
    backend: Option<Box<dyn TableBackend>>,
    persist_if_missing: bool,
}

impl EmbeddingStoreBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            config: StoreConfig::default(),
            backend: None,
            persist_if_missing: false,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum number of entries (requires an eviction policy).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = Some(capacity);
        self
    }

    /// Eviction policy (requires a capacity).
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = Some(policy);
        self
    }

    /// Load from, and by default save to, `path`.
    pub fn persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persistence_path = Some(path.into());
        self
    }

    /// Select a built-in backend.
    pub fn backend_kind(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self.backend = None;
        self
    }

    /// Use a custom backend instead of the configured kind.
    pub fn backend(mut self, backend: Box<dyn TableBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Write an empty table at the persistence path when no file exists.
    pub fn persist_if_missing(mut self, enabled: bool) -> Self {
        self.persist_if_missing = enabled;
        self
    }

    /// Validate the configuration and load (or create) the table.
    pub fn build(self) -> Result<EmbeddingStore> {
        let eviction = self.config.eviction()?;
        let validator = SchemaValidator::new(TableSchema::for_usage_tracking(eviction.is_some()));
        let backend = match self.backend {
            Some(backend) => backend,
            None => backend::backend_for(self.config.backend)?,
        };

        let table = match &self.config.persistence_path {
            Some(path) => {
                backend::load_or_create(backend.as_ref(), path, &validator, self.persist_if_missing)?
            }
            None => CacheTable::new(validator.schema()),
        };
        validator.validate_table(&table)?;

        debug!(
            provider = self.provider.name(),
            backend = backend.name(),
            entries = table.len(),
            schema = %validator.schema(),
            "embedding store ready"
        );

        Ok(EmbeddingStore {
            provider: self.provider,
            table,
            validator,
            eviction,
            config: self.config,
            backend,
        })
    }
}

/// Classify any failure raised inside the provider as a provider error.
fn into_provider_error(err: EmbestoreError) -> EmbestoreError {
    match err {
        EmbestoreError::Provider(_) | EmbestoreError::ProviderContract { .. } => err,
        other => EmbestoreError::Provider(Box::new(other)),
    }
}

/// Deduplicate keys, keeping first-seen order.
fn dedup_keys<'a>(keys: &[&'a str]) -> Vec<&'a str> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().copied().filter(|key| seen.insert(*key)).collect()
}

/// Fill miss rows with provider vectors, by position, and bump usage.
fn merge_rows(rows: Vec<LookupRow>, fresh: Vec<Vec<f32>>) -> Result<Vec<CacheEntry>> {
    let expected = rows.iter().filter(|row| !row.is_hit()).count();
    let returned = fresh.len();
    let mut fresh = fresh.into_iter();

    rows.into_iter()
        .map(|row| {
            let vector = match row.vector {
                Some(vector) => vector,
                None => fresh
                    .next()
                    .ok_or(EmbestoreError::ProviderContract { expected, returned })?,
            };
            Ok(CacheEntry {
                key: row.key,
                vector,
                usage_count: row.usage_count.saturating_add(1),
            })
        })
        .collect()
}
