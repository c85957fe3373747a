//! Request-size limiting decorator.
//!
//! [`ChunkedProvider`] splits a large request into calls of at most
//! `batch_size` texts each, sent sequentially, and concatenates the results.
//! Useful for remote encoders that cap their payload size.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::traits::EmbeddingProvider;
use crate::{EmbestoreError, Result};

/// Default maximum number of texts per provider call.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(100).unwrap();

/// Wraps a provider so no single call exceeds `batch_size` texts.
pub struct ChunkedProvider {
    inner: Arc<dyn EmbeddingProvider>,
    batch_size: NonZeroUsize,
}

impl ChunkedProvider {
    /// Wrap `inner`, limiting each call to `batch_size` texts.
    ///
    /// Fails with a configuration error if `batch_size` is 0.
    pub fn new(inner: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Result<Self> {
        let batch_size = NonZeroUsize::new(batch_size).ok_or_else(|| {
            EmbestoreError::Configuration("batch_size must be larger than 0".to_string())
        })?;
        Ok(Self { inner, batch_size })
    }

    /// Wrap `inner` with [`DEFAULT_BATCH_SIZE`].
    pub fn with_default_batch_size(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }
}

#[async_trait]
impl EmbeddingProvider for ChunkedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, chunk) in texts.chunks(self.batch_size.get()).enumerate() {
            debug!(
                provider = self.inner.name(),
                chunk = index,
                size = chunk.len(),
                "embedding chunk"
            );
            let chunk_vectors = self.inner.embed(chunk).await?;
            if chunk_vectors.len() != chunk.len() {
                warn!(
                    provider = self.inner.name(),
                    expected = chunk.len(),
                    returned = chunk_vectors.len(),
                    "provider returned wrong number of vectors"
                );
                return Err(EmbestoreError::ProviderContract {
                    expected: chunk.len(),
                    returned: chunk_vectors.len(),
                });
            }
            vectors.extend(chunk_vectors);
        }
        Ok(vectors)
    }
}
