//! Parquet backend (Arrow columnar layout).
//!
//! Written files use `key: Utf8`, `vector: List<Float32>` and, when usage
//! is tracked, `usage_count: UInt64`. Files produced by other tools are
//! accepted as long as the columns can be widened/narrowed losslessly
//! enough: `LargeUtf8` keys, `Float64` or `LargeList` vectors, and any
//! 32/64-bit integer usage column.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Float32Builder, ListBuilder, StringBuilder, UInt64Builder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float32Type, Schema, UInt64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::{TableBackend, open_existing, report_duplicates, write_atomic};
use crate::cache::schema::{KEY_COLUMN, SchemaValidator, TableSchema, USAGE_COLUMN, VECTOR_COLUMN};
use crate::cache::table::{CacheEntry, CacheTable};
use crate::error::SchemaError;
use crate::{EmbestoreError, Result};

/// Stores the table as a single Parquet file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetBackend;

impl ParquetBackend {
    pub fn new() -> Self {
        Self
    }
}

impl TableBackend for ParquetBackend {
    fn name(&self) -> &str {
        "parquet"
    }

    fn load(&self, path: &Path, validator: &SchemaValidator) -> Result<Option<CacheTable>> {
        let Some(file) = open_existing(path)? else {
            return Ok(None);
        };
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let arrow_schema = builder.schema().clone();

        validator.validate_columns(arrow_schema.fields().iter().map(|f| f.name().as_str()))?;
        check_types(&arrow_schema, validator.schema())?;

        let mut rows = Vec::new();
        for batch in builder.build()? {
            read_rows(&batch?, validator.schema(), &mut rows)?;
        }

        let (table, dropped) = CacheTable::from_rows(validator.schema(), rows);
        report_duplicates(path, dropped);
        Ok(Some(table))
    }

    fn save(&self, table: &CacheTable, path: &Path) -> Result<()> {
        let batch = to_record_batch(table)?;
        write_atomic(path, |file| {
            let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
            if batch.num_rows() > 0 {
                writer.write(&batch)?;
            }
            let file = writer.into_inner()?;
            file.sync_all()?;
            Ok(())
        })
    }
}

fn vector_type() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Float32, true)))
}

fn check_types(arrow_schema: &Schema, schema: TableSchema) -> Result<()> {
    check_type(arrow_schema, KEY_COLUMN, "Utf8", |t| {
        matches!(t, DataType::Utf8 | DataType::LargeUtf8)
    })?;
    check_type(arrow_schema, VECTOR_COLUMN, "List<Float32>", |t| match t {
        DataType::List(item) | DataType::LargeList(item) => {
            matches!(item.data_type(), DataType::Float32 | DataType::Float64)
        }
        _ => false,
    })?;
    if schema.tracks_usage() {
        check_type(arrow_schema, USAGE_COLUMN, "UInt64", |t| {
            matches!(
                t,
                DataType::UInt64 | DataType::UInt32 | DataType::Int64 | DataType::Int32
            )
        })?;
    }
    Ok(())
}

fn check_type(
    arrow_schema: &Schema,
    column: &str,
    expected: &str,
    accepted: impl Fn(&DataType) -> bool,
) -> Result<()> {
    let field = arrow_schema
        .field_with_name(column)
        .map_err(|_| SchemaError::MissingColumn(column.to_string()))?;
    if !accepted(field.data_type()) {
        return Err(SchemaError::ColumnType {
            column: column.to_string(),
            expected: expected.to_string(),
            found: field.data_type().to_string(),
        }
        .into());
    }
    Ok(())
}

fn column_as(batch: &RecordBatch, column: &str, to_type: &DataType) -> Result<ArrayRef> {
    let array = batch
        .column_by_name(column)
        .ok_or_else(|| SchemaError::MissingColumn(column.to_string()))?;
    Ok(cast(array.as_ref(), to_type)?)
}

fn type_error(column: &str, expected: &str, found: &DataType) -> EmbestoreError {
    SchemaError::ColumnType {
        column: column.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
    .into()
}

fn null_value(column: &str, row: usize) -> EmbestoreError {
    SchemaError::NullValue {
        column: column.to_string(),
        row,
    }
    .into()
}

fn read_rows(batch: &RecordBatch, schema: TableSchema, rows: &mut Vec<CacheEntry>) -> Result<()> {
    let keys = column_as(batch, KEY_COLUMN, &DataType::Utf8)?;
    let keys = keys
        .as_string_opt::<i32>()
        .ok_or_else(|| type_error(KEY_COLUMN, "Utf8", keys.data_type()))?;

    let vectors = column_as(batch, VECTOR_COLUMN, &vector_type())?;
    let vectors = vectors
        .as_list_opt::<i32>()
        .ok_or_else(|| type_error(VECTOR_COLUMN, "List<Float32>", vectors.data_type()))?;

    let usage = if schema.tracks_usage() {
        Some(column_as(batch, USAGE_COLUMN, &DataType::UInt64)?)
    } else {
        None
    };
    let usage = match &usage {
        Some(array) => Some(
            array
                .as_primitive_opt::<UInt64Type>()
                .ok_or_else(|| type_error(USAGE_COLUMN, "UInt64", array.data_type()))?,
        ),
        None => None,
    };

    let offset = rows.len();
    rows.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row = offset + i;
        if keys.is_null(i) {
            return Err(null_value(KEY_COLUMN, row));
        }
        if vectors.is_null(i) {
            return Err(null_value(VECTOR_COLUMN, row));
        }

        let values = vectors.value(i);
        let values = values
            .as_primitive_opt::<Float32Type>()
            .ok_or_else(|| type_error(VECTOR_COLUMN, "List<Float32>", values.data_type()))?;
        if values.null_count() > 0 {
            return Err(null_value(VECTOR_COLUMN, row));
        }

        let usage_count = match usage {
            Some(usage) if usage.is_null(i) => return Err(null_value(USAGE_COLUMN, row)),
            Some(usage) => usage.value(i),
            None => 0,
        };

        rows.push(CacheEntry {
            key: keys.value(i).to_string(),
            vector: values.values().to_vec(),
            usage_count,
        });
    }
    Ok(())
}

fn to_record_batch(table: &CacheTable) -> Result<RecordBatch> {
    let mut keys = StringBuilder::new();
    let mut vectors = ListBuilder::new(Float32Builder::new());
    let mut usage = UInt64Builder::new();
    for entry in table.entries() {
        keys.append_value(entry.key);
        vectors.values().append_slice(entry.vector);
        vectors.append(true);
        usage.append_value(entry.usage_count);
    }

    let vectors = vectors.finish();
    let mut fields = vec![
        Field::new(KEY_COLUMN, DataType::Utf8, false),
        Field::new(VECTOR_COLUMN, vectors.data_type().clone(), false),
    ];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(keys.finish()), Arc::new(vectors)];
    if table.schema().tracks_usage() {
        fields.push(Field::new(USAGE_COLUMN, DataType::UInt64, false));
        columns.push(Arc::new(usage.finish()));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Builder, Int64Array, StringArray};

    fn write_batch(path: &Path, batch: &RecordBatch) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
    }

    fn sample_table(schema: TableSchema) -> CacheTable {
        let mut table = CacheTable::new(schema);
        table.upsert([
            CacheEntry::new("I want some dinner", vec![0.25, -1.5, 3.0], 4),
            CacheEntry::new("Bella Ciao", vec![1.0, 2.0, 3.0], 1),
        ]);
        table
    }

    #[test]
    fn round_trip_with_usage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.parquet");
        let table = sample_table(TableSchema::WithUsage);

        ParquetBackend.save(&table, &path).unwrap();
        let loaded = ParquetBackend
            .load(&path, &SchemaValidator::new(TableSchema::WithUsage))
            .unwrap()
            .unwrap();

        let original: Vec<CacheEntry> = table.entries().map(|e| e.to_entry()).collect();
        let restored: Vec<CacheEntry> = loaded.entries().map(|e| e.to_entry()).collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn round_trip_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");

        ParquetBackend
            .save(&CacheTable::new(TableSchema::Plain), &path)
            .unwrap();
        let loaded = ParquetBackend
            .load(&path, &SchemaValidator::new(TableSchema::Plain))
            .unwrap()
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn plain_file_rejected_when_usage_expected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.parquet");
        ParquetBackend
            .save(&sample_table(TableSchema::Plain), &path)
            .unwrap();

        let err = ParquetBackend
            .load(&path, &SchemaValidator::new(TableSchema::WithUsage))
            .unwrap_err();
        assert!(matches!(
            err,
            EmbestoreError::Schema(SchemaError::MissingColumn(ref c)) if c == USAGE_COLUMN
        ));
    }

    #[test]
    fn float64_vectors_and_int64_usage_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.parquet");

        let mut vectors = ListBuilder::new(Float64Builder::new());
        vectors.values().append_slice(&[0.5, 1.5]);
        vectors.append(true);
        let vectors = vectors.finish();
        let schema = Schema::new(vec![
            Field::new(KEY_COLUMN, DataType::Utf8, false),
            Field::new(VECTOR_COLUMN, vectors.data_type().clone(), true),
            Field::new(USAGE_COLUMN, DataType::Int64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["x"])),
                Arc::new(vectors),
                Arc::new(Int64Array::from(vec![3])),
            ],
        )
        .unwrap();
        write_batch(&path, &batch);

        let table = ParquetBackend
            .load(&path, &SchemaValidator::new(TableSchema::WithUsage))
            .unwrap()
            .unwrap();
        let entry = table.get("x").unwrap();
        assert_eq!(entry.vector, &[0.5, 1.5]);
        assert_eq!(entry.usage_count, 3);
    }

    #[test]
    fn wrong_key_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.parquet");

        let mut vectors = ListBuilder::new(Float32Builder::new());
        vectors.values().append_slice(&[1.0]);
        vectors.append(true);
        let vectors = vectors.finish();
        let schema = Schema::new(vec![
            Field::new(KEY_COLUMN, DataType::Int64, false),
            Field::new(VECTOR_COLUMN, vectors.data_type().clone(), false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(vec![1])), Arc::new(vectors)],
        )
        .unwrap();
        write_batch(&path, &batch);

        let err = ParquetBackend
            .load(&path, &SchemaValidator::new(TableSchema::Plain))
            .unwrap_err();
        assert!(matches!(
            err,
            EmbestoreError::Schema(SchemaError::ColumnType { ref column, .. }) if column == KEY_COLUMN
        ));
    }

    #[test]
    fn negative_usage_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("negative.parquet");

        let mut vectors = ListBuilder::new(Float32Builder::new());
        vectors.values().append_slice(&[1.0]);
        vectors.append(true);
        let vectors = vectors.finish();
        let schema = Schema::new(vec![
            Field::new(KEY_COLUMN, DataType::Utf8, false),
            Field::new(VECTOR_COLUMN, vectors.data_type().clone(), false),
            Field::new(USAGE_COLUMN, DataType::Int64, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["k"])),
                Arc::new(vectors),
                Arc::new(Int64Array::from(vec![-2])),
            ],
        )
        .unwrap();
        write_batch(&path, &batch);

        let err = ParquetBackend
            .load(&path, &SchemaValidator::new(TableSchema::WithUsage))
            .unwrap_err();
        assert!(err.is_schema());
    }
}
