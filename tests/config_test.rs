//! Store construction from configuration.

use std::sync::Arc;

use async_trait::async_trait;

use embestore::{
    EmbeddingProvider, EmbeddingStore, EvictionPolicy, FileConfig, Result, StoreConfig,
};

struct NullProvider;

#[async_trait]
impl EmbeddingProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.0]; texts.len()])
    }
}

#[test]
fn zero_capacity_fails_construction() {
    let config = StoreConfig::new()
        .capacity(0)
        .eviction_policy(EvictionPolicy::Lru);

    let err = EmbeddingStore::new(Arc::new(NullProvider), config).unwrap_err();

    assert!(err.is_configuration());
}

#[test]
fn capacity_without_policy_fails_construction() {
    let err = EmbeddingStore::builder(Arc::new(NullProvider))
        .capacity(3)
        .build()
        .unwrap_err();

    assert!(err.is_configuration());
}

#[test]
fn policy_without_capacity_fails_construction() {
    let err = EmbeddingStore::builder(Arc::new(NullProvider))
        .eviction_policy(EvictionPolicy::Lfu)
        .build()
        .unwrap_err();

    assert!(err.is_configuration());
}

#[test]
fn store_built_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[store]\ncapacity = 8\neviction_policy = \"lru\"\nbackend = \"json\"\npersistence_path = {:?}\n",
            cache_path.to_string_lossy()
        ),
    )
    .unwrap();

    let file = FileConfig::load(Some(&config_path)).unwrap();
    let store = EmbeddingStore::new(Arc::new(NullProvider), file.store).unwrap();

    let eviction = store.eviction().unwrap();
    assert_eq!(eviction.policy(), EvictionPolicy::Lru);
    assert_eq!(eviction.capacity(), 8);
    assert_eq!(store.provider_name(), "null");
}

#[test]
fn unknown_config_field_rejected() {
    let err = FileConfig::from_toml("[store]\nmax_size = 3\n").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn explicit_missing_config_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    assert!(FileConfig::load_or_default(Some(&missing)).is_err());
}
