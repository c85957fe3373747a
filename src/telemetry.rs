//! Telemetry metric name constants.
//!
//! Centralised metric names for embestore operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `embestore_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `status` - provider call outcome: "ok" or "error"
//! - `policy` - eviction policy: "lru" or "lfu"

/// Total requested keys (after deduplication) served from the cache.
pub const CACHE_HITS_TOTAL: &str = "embestore_cache_hits_total";

/// Total requested keys (after deduplication) that needed the provider.
pub const CACHE_MISSES_TOTAL: &str = "embestore_cache_misses_total";

/// Total calls made to the embedding provider.
///
/// Labels: `status` ("ok" | "error").
pub const PROVIDER_REQUESTS_TOTAL: &str = "embestore_provider_requests_total";

/// Total entries dropped by eviction passes.
///
/// Labels: `policy`.
pub const EVICTIONS_TOTAL: &str = "embestore_evictions_total";

/// Number of entries held by the store after the last retrieval.
pub const ENTRIES: &str = "embestore_entries";
