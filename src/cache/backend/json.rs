//! Columnar JSON backend.
//!
//! The document stores one array per column, so it carries the same
//! column set the Parquet backend does and goes through the same
//! validation:
//!
//! ```json
//! {
//!   "version": 1,
//!   "columns": {
//!     "key": ["hello", "world"],
//!     "vector": [[0.1, 0.2], [0.3, 0.4]],
//!     "usage_count": [3, 1]
//!   }
//! }
//! ```

use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{TableBackend, open_existing, report_duplicates, write_atomic};
use crate::cache::schema::{KEY_COLUMN, SchemaValidator, USAGE_COLUMN, VECTOR_COLUMN};
use crate::cache::table::{CacheEntry, CacheTable};
use crate::error::SchemaError;
use crate::{EmbestoreError, Result};

/// Maximum supported document format version.
const MAX_SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct JsonDocument {
    version: u32,
    columns: Map<String, Value>,
}

/// Stores the table as a single JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBackend;

impl JsonBackend {
    pub fn new() -> Self {
        Self
    }
}

impl TableBackend for JsonBackend {
    fn name(&self) -> &str {
        "json"
    }

    fn load(&self, path: &Path, validator: &SchemaValidator) -> Result<Option<CacheTable>> {
        let Some(file) = open_existing(path)? else {
            return Ok(None);
        };
        let mut document: JsonDocument = serde_json::from_reader(BufReader::new(file))?;

        if document.version > MAX_SUPPORTED_VERSION {
            return Err(EmbestoreError::Configuration(format!(
                "unsupported cache document version {} (max supported: {MAX_SUPPORTED_VERSION})",
                document.version
            )));
        }
        validator.validate_columns(document.columns.keys().map(String::as_str))?;

        let keys: Vec<Option<String>> = take_column(&mut document.columns, KEY_COLUMN, "string")?;
        let vectors: Vec<Option<Vec<f32>>> =
            take_column(&mut document.columns, VECTOR_COLUMN, "list of floats")?;
        check_length(VECTOR_COLUMN, keys.len(), vectors.len())?;

        let usage: Vec<Option<u64>> = if validator.schema().tracks_usage() {
            let usage = take_column(&mut document.columns, USAGE_COLUMN, "unsigned integer")?;
            check_length(USAGE_COLUMN, keys.len(), usage.len())?;
            usage
        } else {
            vec![Some(0); keys.len()]
        };

        let mut rows = Vec::with_capacity(keys.len());
        for (row, ((key, vector), usage_count)) in keys
            .into_iter()
            .zip(vectors)
            .zip(usage)
            .enumerate()
        {
            rows.push(CacheEntry {
                key: key.ok_or_else(|| null_value(KEY_COLUMN, row))?,
                vector: vector.ok_or_else(|| null_value(VECTOR_COLUMN, row))?,
                usage_count: usage_count.ok_or_else(|| null_value(USAGE_COLUMN, row))?,
            });
        }

        let (table, dropped) = CacheTable::from_rows(validator.schema(), rows);
        report_duplicates(path, dropped);
        Ok(Some(table))
    }

    fn save(&self, table: &CacheTable, path: &Path) -> Result<()> {
        let mut keys = Vec::with_capacity(table.len());
        let mut vectors = Vec::with_capacity(table.len());
        let mut usage = Vec::with_capacity(table.len());
        for (row, entry) in table.entries().enumerate() {
            if let Some(value) = entry.vector.iter().find(|v| !v.is_finite()) {
                return Err(SchemaError::ColumnType {
                    column: VECTOR_COLUMN.to_string(),
                    expected: "finite floats".to_string(),
                    found: format!("{value} at row {row}"),
                }
                .into());
            }
            keys.push(Value::from(entry.key));
            vectors.push(Value::from(entry.vector.to_vec()));
            usage.push(Value::from(entry.usage_count));
        }

        let mut columns = Map::new();
        columns.insert(KEY_COLUMN.to_string(), Value::Array(keys));
        columns.insert(VECTOR_COLUMN.to_string(), Value::Array(vectors));
        if table.schema().tracks_usage() {
            columns.insert(USAGE_COLUMN.to_string(), Value::Array(usage));
        }
        let document = JsonDocument {
            version: MAX_SUPPORTED_VERSION,
            columns,
        };

        write_atomic(path, |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &document)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })
    }
}

fn take_column<T: DeserializeOwned>(
    columns: &mut Map<String, Value>,
    name: &str,
    expected: &str,
) -> Result<Vec<T>> {
    let value = columns
        .remove(name)
        .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
    serde_json::from_value(value).map_err(|e| {
        SchemaError::ColumnType {
            column: name.to_string(),
            expected: format!("array of {expected}"),
            found: e.to_string(),
        }
        .into()
    })
}

fn check_length(column: &str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(SchemaError::ColumnLength {
            column: column.to_string(),
            expected,
            found,
        }
        .into());
    }
    Ok(())
}

fn null_value(column: &str, row: usize) -> EmbestoreError {
    SchemaError::NullValue {
        column: column.to_string(),
        row,
    }
    .into()
}
