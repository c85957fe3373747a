//! In-memory cache table.
//!
//! [`CacheTable`] is an ordered key → entry mapping. Order is upsert
//! recency: every upsert moves the key to the most recent end, which is
//! what LRU eviction truncates against. Lookups never reorder.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::schema::TableSchema;

/// One cached embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The text the vector was computed for.
    pub key: String,
    /// The embedding.
    pub vector: Vec<f32>,
    /// How many retrievals requested this key.
    pub usage_count: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, vector: Vec<f32>, usage_count: u64) -> Self {
        Self {
            key: key.into(),
            vector,
            usage_count,
        }
    }
}

/// Borrowed view of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryRef<'a> {
    pub key: &'a str,
    pub vector: &'a [f32],
    pub usage_count: u64,
}

impl EntryRef<'_> {
    pub fn to_entry(&self) -> CacheEntry {
        CacheEntry::new(self.key, self.vector.to_vec(), self.usage_count)
    }
}

/// One row of a left-outer lookup.
///
/// `vector` is `None` for keys absent from the table, in which case
/// `usage_count` is 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRow {
    pub key: String,
    pub vector: Option<Vec<f32>>,
    pub usage_count: u64,
}

impl LookupRow {
    /// Whether the key was found in the table.
    pub fn is_hit(&self) -> bool {
        self.vector.is_some()
    }
}

/// A fully-resolved batch waiting to be merged into a table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryBatch {
    schema: TableSchema,
    entries: Vec<CacheEntry>,
}

impl EntryBatch {
    pub fn new(schema: TableSchema, entries: Vec<CacheEntry>) -> Self {
        Self { schema, entries }
    }

    pub fn schema(&self) -> TableSchema {
        self.schema
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<CacheEntry> {
        self.entries
    }
}

#[derive(Debug, Clone)]
struct Slot {
    recency: u64,
    vector: Vec<f32>,
    usage_count: u64,
}

/// Ordered key → (vector, usage) mapping with one entry per key.
#[derive(Debug, Clone)]
pub struct CacheTable {
    schema: TableSchema,
    slots: HashMap<String, Slot>,
    /// recency → key, oldest first
    order: BTreeMap<u64, String>,
    next_recency: u64,
}

impl CacheTable {
    /// Create an empty table with the given layout.
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            slots: HashMap::new(),
            order: BTreeMap::new(),
            next_recency: 0,
        }
    }

    /// Build a table from rows in storage order (oldest first).
    ///
    /// Rows repeating an earlier key are dropped: the first occurrence
    /// wins, matching what a lookup would have returned. Returns the table
    /// and the number of dropped rows.
    pub fn from_rows(
        schema: TableSchema,
        rows: impl IntoIterator<Item = CacheEntry>,
    ) -> (Self, usize) {
        let mut table = Self::new(schema);
        let mut dropped = 0;
        for row in rows {
            if table.contains(&row.key) {
                dropped += 1;
                continue;
            }
            table.upsert_one(row);
        }
        (table, dropped)
    }

    pub fn schema(&self) -> TableSchema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Borrow a single entry.
    pub fn get(&self, key: &str) -> Option<EntryRef<'_>> {
        self.slots.get_key_value(key).map(|(key, slot)| EntryRef {
            key,
            vector: &slot.vector,
            usage_count: slot.usage_count,
        })
    }

    /// Left-outer lookup: one row per requested key, in request order.
    pub fn lookup(&self, keys: &[&str]) -> Vec<LookupRow> {
        keys.iter()
            .map(|key| match self.slots.get(*key) {
                Some(slot) => LookupRow {
                    key: (*key).to_string(),
                    vector: Some(slot.vector.clone()),
                    usage_count: slot.usage_count,
                },
                None => LookupRow {
                    key: (*key).to_string(),
                    vector: None,
                    usage_count: 0,
                },
            })
            .collect()
    }

    /// Insert or overwrite each entry, in order.
    ///
    /// An overwritten key takes the incoming vector and usage count and
    /// becomes the most recent entry.
    pub fn upsert(&mut self, entries: impl IntoIterator<Item = CacheEntry>) {
        for entry in entries {
            self.upsert_one(entry);
        }
    }

    fn upsert_one(&mut self, entry: CacheEntry) {
        let recency = self.next_recency;
        self.next_recency += 1;

        let slot = Slot {
            recency,
            vector: entry.vector,
            usage_count: entry.usage_count,
        };
        if let Some(previous) = self.slots.insert(entry.key.clone(), slot) {
            self.order.remove(&previous.recency);
        }
        self.order.insert(recency, entry.key);
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.order.remove(&slot.recency);
                true
            }
            None => false,
        }
    }

    /// Iterate entries from least to most recently upserted.
    pub fn entries(&self) -> impl Iterator<Item = EntryRef<'_>> + '_ {
        self.order.values().filter_map(|key| self.get(key))
    }

    /// Keep the `keep` most recently upserted entries; return evicted keys,
    /// oldest first.
    pub fn retain_most_recent(&mut self, keep: usize) -> Vec<String> {
        let mut evicted = Vec::with_capacity(self.len().saturating_sub(keep));
        while self.slots.len() > keep {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.slots.remove(&key);
            evicted.push(key);
        }
        evicted
    }

    /// Keep the `keep` entries with the highest usage count; return evicted
    /// keys, least used first.
    ///
    /// Entries are ranked ascending by `(usage_count, recency)`, so among
    /// equally used entries the most recently upserted survive.
    pub fn retain_most_used(&mut self, keep: usize) -> Vec<String> {
        let excess = self.len().saturating_sub(keep);
        if excess == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(u64, u64)> = self
            .slots
            .values()
            .map(|slot| (slot.usage_count, slot.recency))
            .collect();
        ranked.sort_unstable();

        let mut evicted = Vec::with_capacity(excess);
        for (_, recency) in ranked.into_iter().take(excess) {
            if let Some(key) = self.order.remove(&recency) {
                self.slots.remove(&key);
                evicted.push(key);
            }
        }
        evicted
    }
}
