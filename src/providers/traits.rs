//! Provider trait for the embedding capability.
//!
//! The cache depends only on [`EmbeddingProvider`]: a remote RPC service,
//! a local encoder, or a test stub all plug in the same way. Providers are
//! built by the caller and injected as `Arc<dyn EmbeddingProvider>`, so
//! their lifecycle is independent of any store that uses them.
//!
//! # Contract
//!
//! - One vector per input text, in input order.
//! - An empty input returns an empty output without error.
//! - Retries, timeouts and batching limits are the provider's own concern;
//!   the store never retries a failed call.
//!
//! # Example
//!
//! ```ignore
//! struct RemoteEncoder { client: RpcClient }
//!
//! #[async_trait]
//! impl EmbeddingProvider for RemoteEncoder {
//!     fn name(&self) -> &str { "remote" }
//!
//!     async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
//!         self.client.encode(texts).await.map_err(EmbestoreError::provider)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;

/// Provider for text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate one embedding per text, preserving order.
    ///
    /// Failures should be wrapped with
    /// [`EmbestoreError::provider()`](crate::EmbestoreError::provider).
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}
