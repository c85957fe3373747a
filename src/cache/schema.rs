//! Column layout of the cache table and its validation.
//!
//! A table always has a `key` column plus its value columns: `vector`
//! alone, or `vector` and `usage_count` when the store tracks usage for
//! eviction. [`SchemaValidator`] checks persisted files and in-flight
//! batches against that layout before they touch the store.

use std::collections::HashSet;
use std::fmt;

use crate::error::SchemaError;

use super::table::{CacheTable, EntryBatch};

/// Name of the unique key column.
pub const KEY_COLUMN: &str = "key";

/// Name of the embedding column.
pub const VECTOR_COLUMN: &str = "vector";

/// Name of the usage counter column (present only when eviction is enabled).
pub const USAGE_COLUMN: &str = "usage_count";

/// Declared column layout of a cache table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableSchema {
    /// `key`, `vector`
    Plain,
    /// `key`, `vector`, `usage_count`
    WithUsage,
}

impl TableSchema {
    /// Layout for a store with or without usage tracking.
    pub fn for_usage_tracking(track_usage: bool) -> Self {
        if track_usage {
            Self::WithUsage
        } else {
            Self::Plain
        }
    }

    /// Whether `usage_count` is part of the layout.
    pub fn tracks_usage(&self) -> bool {
        matches!(self, Self::WithUsage)
    }

    /// Value columns, excluding the key.
    pub fn value_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Plain => &[VECTOR_COLUMN],
            Self::WithUsage => &[VECTOR_COLUMN, USAGE_COLUMN],
        }
    }

    /// All columns, key first.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Plain => &[KEY_COLUMN, VECTOR_COLUMN],
            Self::WithUsage => &[KEY_COLUMN, VECTOR_COLUMN, USAGE_COLUMN],
        }
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.columns().join(", "))
    }
}

/// Checks tables against an expected [`TableSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaValidator {
    schema: TableSchema,
}

impl SchemaValidator {
    pub fn new(schema: TableSchema) -> Self {
        Self { schema }
    }

    /// The layout this validator enforces.
    pub fn schema(&self) -> TableSchema {
        self.schema
    }

    /// Validate a set of column names.
    ///
    /// Checks, in order: the key column, the vector column, the usage
    /// column (if tracked), then rejects anything else.
    pub fn validate_columns<'a, I>(&self, columns: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut extra = Vec::new();
        for column in columns {
            if !seen.insert(column) {
                return Err(SchemaError::UnexpectedColumn(column.to_string()));
            }
            if !self.schema.columns().iter().any(|c| *c == column) {
                extra.push(column);
            }
        }

        for expected in self.schema.columns() {
            if !seen.contains(expected) {
                return Err(SchemaError::MissingColumn((*expected).to_string()));
            }
        }

        match extra.first() {
            Some(column) => Err(SchemaError::UnexpectedColumn((*column).to_string())),
            None => Ok(()),
        }
    }

    /// Validate the layout of a whole table.
    pub fn validate_table(&self, table: &CacheTable) -> Result<(), SchemaError> {
        self.validate_columns(table.schema().columns().iter().copied())
    }

    /// Validate an incoming batch: layout, plus one row per key.
    pub fn validate_batch(&self, batch: &EntryBatch) -> Result<(), SchemaError> {
        self.validate_columns(batch.schema().columns().iter().copied())?;

        let mut keys = HashSet::with_capacity(batch.len());
        for entry in batch.entries() {
            if !keys.insert(entry.key.as_str()) {
                return Err(SchemaError::DuplicateKey(entry.key.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::table::CacheEntry;

    fn with_usage() -> SchemaValidator {
        SchemaValidator::new(TableSchema::WithUsage)
    }

    #[test]
    fn accepts_exact_layouts() {
        assert!(with_usage()
            .validate_columns(["key", "vector", "usage_count"])
            .is_ok());
        assert!(SchemaValidator::new(TableSchema::Plain)
            .validate_columns(["vector", "key"])
            .is_ok());
    }

    #[test]
    fn missing_key_reported_first() {
        let err = with_usage().validate_columns(["vector"]).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn(c) if c == KEY_COLUMN));
    }

    #[test]
    fn missing_usage_column() {
        let err = with_usage().validate_columns(["key", "vector"]).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn(c) if c == USAGE_COLUMN));
    }

    #[test]
    fn usage_column_unexpected_without_tracking() {
        let err = SchemaValidator::new(TableSchema::Plain)
            .validate_columns(["key", "vector", "usage_count"])
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnexpectedColumn(c) if c == USAGE_COLUMN));
    }

    #[test]
    fn extraneous_column_rejected() {
        let err = with_usage()
            .validate_columns(["key", "vector", "usage_count", "model"])
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnexpectedColumn(c) if c == "model"));
    }

    #[test]
    fn repeated_column_rejected() {
        let err = SchemaValidator::new(TableSchema::Plain)
            .validate_columns(["key", "vector", "vector"])
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnexpectedColumn(c) if c == VECTOR_COLUMN));
    }

    #[test]
    fn table_with_other_layout_rejected() {
        let table = CacheTable::new(TableSchema::Plain);
        assert!(with_usage().validate_table(&table).is_err());
        assert!(SchemaValidator::new(TableSchema::Plain)
            .validate_table(&table)
            .is_ok());
    }

    #[test]
    fn batch_with_duplicate_key_rejected() {
        let batch = EntryBatch::new(
            TableSchema::WithUsage,
            vec![
                CacheEntry::new("a", vec![1.0], 1),
                CacheEntry::new("a", vec![2.0], 1),
            ],
        );
        let err = with_usage().validate_batch(&batch).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateKey(k) if k == "a"));
    }

    #[test]
    fn schema_display_lists_columns() {
        assert_eq!(TableSchema::WithUsage.to_string(), "key, vector, usage_count");
    }
}
