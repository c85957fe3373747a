//! Embedding providers.
//!
//! Concrete providers live outside this crate. This module holds the
//! [`EmbeddingProvider`] trait the store consumes, and decorators that wrap
//! any provider.

pub mod chunked;
pub mod traits;

pub use chunked::ChunkedProvider;
pub use traits::EmbeddingProvider;
