//! Persistence of the cache table.
//!
//! A [`TableBackend`] reads and writes a whole [`CacheTable`] at a path.
//! Backends validate the stored columns with a [`SchemaValidator`] before
//! building a table, so a mismatching file never reaches the store.
//!
//! Writes go to `<file>.tmp` next to the target and are renamed into place
//! once complete, so an interrupted save leaves the previous file intact.

#[cfg(feature = "parquet")]
mod columnar;
mod json;

#[cfg(feature = "parquet")]
pub use columnar::ParquetBackend;
pub use json::JsonBackend;

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::schema::SchemaValidator;
use super::table::CacheTable;
use crate::config::BackendKind;
use crate::{EmbestoreError, Result};

/// Storage format for a cache table.
pub trait TableBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Read the table stored at `path`.
    ///
    /// Returns `Ok(None)` when nothing is stored there.
    fn load(&self, path: &Path, validator: &SchemaValidator) -> Result<Option<CacheTable>>;

    /// Write `table` to `path`, replacing any previous content.
    fn save(&self, table: &CacheTable, path: &Path) -> Result<()>;
}

/// Instantiate the backend for a configured [`BackendKind`].
pub fn backend_for(kind: BackendKind) -> Result<Box<dyn TableBackend>> {
    match kind {
        #[cfg(feature = "parquet")]
        BackendKind::Parquet => Ok(Box::new(ParquetBackend::new())),
        #[cfg(not(feature = "parquet"))]
        BackendKind::Parquet => Err(EmbestoreError::Configuration(
            "parquet backend requires the `parquet` feature".to_string(),
        )),
        BackendKind::Json => Ok(Box::new(JsonBackend::new())),
    }
}

/// Load the table at `path`, or start an empty one.
///
/// With `persist_if_missing`, the fresh empty table is written back so the
/// file exists from then on.
pub fn load_or_create(
    backend: &dyn TableBackend,
    path: &Path,
    validator: &SchemaValidator,
    persist_if_missing: bool,
) -> Result<CacheTable> {
    if let Some(table) = backend.load(path, validator)? {
        info!(
            backend = backend.name(),
            path = %path.display(),
            entries = table.len(),
            "loaded embedding cache"
        );
        return Ok(table);
    }

    let table = CacheTable::new(validator.schema());
    if persist_if_missing {
        backend.save(&table, path)?;
    }
    Ok(table)
}

/// Log rows dropped because their key repeated an earlier row.
pub(crate) fn report_duplicates(path: &Path, dropped: usize) {
    if dropped > 0 {
        warn!(
            path = %path.display(),
            dropped,
            "persisted table repeats keys, keeping first occurrence"
        );
    }
}

/// Open `path` for reading, mapping "not found" to `None`.
pub(crate) fn open_existing(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EmbestoreError::Io(e)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("embestore"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write via `<path>.tmp` then rename over `path`.
///
/// `write` receives the temporary file and must leave it fully written.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let file = File::create(&tmp)?;
    if let Err(e) = write(file) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema::TableSchema;

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/data/cache.parquet")),
            PathBuf::from("/data/cache.parquet.tmp")
        );
    }

    #[test]
    fn write_atomic_keeps_previous_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        fs::write(&path, "previous").unwrap();

        let result = write_atomic(&path, |_file| {
            Err(EmbestoreError::Configuration("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn load_or_create_persists_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let validator = SchemaValidator::new(TableSchema::Plain);

        let table = load_or_create(&JsonBackend::new(), &path, &validator, true).unwrap();
        assert!(table.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn load_or_create_without_persist_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let validator = SchemaValidator::new(TableSchema::Plain);

        load_or_create(&JsonBackend::new(), &path, &validator, false).unwrap();
        assert!(!path.exists());
    }
}
