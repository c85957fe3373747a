//! Bounded-size eviction.
//!
//! Eviction runs once per retrieval, after the batch has been merged, and
//! only when the table holds more than `capacity` entries. It then drops
//! entries in a single pass:
//!
//! - [`EvictionPolicy::Lru`] keeps the `capacity` most recently upserted
//!   entries.
//! - [`EvictionPolicy::Lfu`] keeps the `ceil(capacity / 2)` most used
//!   entries.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::Deserialize;
use tracing::info;

use super::table::CacheTable;
use crate::telemetry;
use crate::{EmbestoreError, Result};

/// Which entries survive an eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum EvictionPolicy {
    /// Least recently upserted entries go first.
    Lru,
    /// Least frequently requested entries go first.
    Lfu,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
        }
    }

    /// Number of entries left after an eviction pass.
    pub fn retained(&self, capacity: NonZeroUsize) -> usize {
        match self {
            Self::Lru => capacity.get(),
            Self::Lfu => capacity.get().div_ceil(2),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = EmbestoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            other => Err(EmbestoreError::Configuration(format!(
                "unknown eviction policy '{other}', expected one of: lru, lfu"
            ))),
        }
    }
}

impl TryFrom<String> for EvictionPolicy {
    type Error = EmbestoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A validated policy/capacity pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    policy: EvictionPolicy,
    capacity: NonZeroUsize,
}

impl Eviction {
    pub fn new(policy: EvictionPolicy, capacity: NonZeroUsize) -> Self {
        Self { policy, capacity }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Whether a table of `len` entries triggers a pass.
    pub fn is_over_capacity(&self, len: usize) -> bool {
        len > self.capacity.get()
    }

    /// Run one eviction pass. Returns the evicted keys.
    pub fn apply(&self, table: &mut CacheTable) -> Vec<String> {
        if !self.is_over_capacity(table.len()) {
            return Vec::new();
        }

        let before = table.len();
        let keep = self.policy.retained(self.capacity);
        let evicted = match self.policy {
            EvictionPolicy::Lru => table.retain_most_recent(keep),
            EvictionPolicy::Lfu => table.retain_most_used(keep),
        };

        metrics::counter!(telemetry::EVICTIONS_TOTAL, "policy" => self.policy.as_str())
            .increment(evicted.len() as u64);
        info!(
            policy = %self.policy,
            capacity = self.capacity.get(),
            before,
            after = table.len(),
            "evicted cache entries"
        );
        evicted
    }
}
