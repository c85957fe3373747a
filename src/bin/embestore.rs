//! embestore - inspect and maintain persisted embedding caches

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use embestore::cache::backend::{self, TableBackend};
use embestore::cache::schema::USAGE_COLUMN;
use embestore::{
    BackendKind, CacheTable, EmbestoreError, Eviction, EvictionPolicy, FileConfig, SchemaError,
    SchemaValidator, StoreConfig, TableSchema,
};

/// Embedding cache maintenance tool
#[derive(Parser)]
#[command(name = "embestore")]
#[command(version)]
#[command(about = "Inspect and compact persisted embedding caches")]
struct Args {
    /// Config file (default: ~/.embestore/config.toml, then /etc/embestore/config.toml)
    #[arg(short, long, env = "EMBESTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage format (default: from file extension, then config)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show row count, dimensions, columns and usage statistics
    Inspect {
        /// Cache file
        file: PathBuf,
    },

    /// List cached keys, least recently stored first
    Keys {
        /// Cache file
        file: PathBuf,
    },

    /// Apply an eviction policy and rewrite the file
    Compact {
        /// Cache file
        file: PathBuf,
        /// Capacity (default: from config)
        #[arg(long)]
        capacity: Option<usize>,
        /// Eviction policy: lru or lfu (default: from config)
        #[arg(long)]
        policy: Option<EvictionPolicy>,
        /// Write the result here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let file_config = FileConfig::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Inspect { file } => {
            let backend = select_backend(args.backend, &file, &file_config.store)?;
            let table = load_any(backend.as_ref(), &file)?;
            print_summary(&file, backend.name(), &table);
        }

        Command::Keys { file } => {
            let backend = select_backend(args.backend, &file, &file_config.store)?;
            let table = load_any(backend.as_ref(), &file)?;
            for entry in table.entries() {
                println!("{}", entry.key);
            }
        }

        Command::Compact {
            file,
            capacity,
            policy,
            output,
        } => {
            let mut config = file_config.store.clone();
            if let Some(capacity) = capacity {
                config.capacity = Some(capacity);
            }
            if let Some(policy) = policy {
                config.eviction_policy = Some(policy);
            }
            let eviction = config.eviction()?.ok_or_else(|| {
                EmbestoreError::Configuration(
                    "compact needs --capacity and --policy (or both in the config file)"
                        .to_string(),
                )
            })?;

            let backend = select_backend(args.backend, &file, &config)?;
            let target = output.as_deref().unwrap_or(&file);
            let (before, table, evicted) = compact(backend.as_ref(), &file, target, eviction)?;
            println!(
                "{}: {before} to {} entries ({} evicted, policy {}, capacity {})",
                target.display(),
                table.len(),
                evicted.len(),
                eviction.policy(),
                eviction.capacity()
            );
        }
    }

    Ok(())
}

/// Explicit flag, then file extension, then configured backend.
fn select_backend(
    explicit: Option<BackendKind>,
    file: &Path,
    config: &StoreConfig,
) -> embestore::Result<Box<dyn TableBackend>> {
    let kind = explicit
        .or_else(|| {
            file.extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| ext.parse().ok())
        })
        .unwrap_or(config.backend);
    backend::backend_for(kind)
}

/// Load `file` in whichever layout it has, evict, and save to `target`.
///
/// Returns the row count before eviction, the compacted table and the
/// evicted keys. A plain layout has zero usage everywhere, so LFU falls back
/// to recency order there.
fn compact(
    backend: &dyn TableBackend,
    file: &Path,
    target: &Path,
    eviction: Eviction,
) -> embestore::Result<(usize, CacheTable, Vec<String>)> {
    let mut table = load_any(backend, file)?;
    let before = table.len();
    let evicted = eviction.apply(&mut table);
    backend.save(&table, target)?;
    Ok((before, table, evicted))
}

/// Load a file of either layout.
fn load_any(backend: &dyn TableBackend, file: &Path) -> embestore::Result<CacheTable> {
    let loaded = match backend.load(file, &SchemaValidator::new(TableSchema::WithUsage)) {
        Err(EmbestoreError::Schema(SchemaError::MissingColumn(column)))
            if column == USAGE_COLUMN =>
        {
            backend.load(file, &SchemaValidator::new(TableSchema::Plain))?
        }
        other => other?,
    };
    loaded.ok_or_else(|| {
        EmbestoreError::Configuration(format!("cache file not found: {}", file.display()))
    })
}

fn print_summary(file: &Path, backend: &str, table: &CacheTable) {
    println!("file: {}", file.display());
    println!("backend: {backend}");
    println!("columns: {}", table.schema());
    println!("rows: {}", table.len());

    let dimensions = table.entries().next().map(|e| e.vector.len());
    match dimensions {
        Some(dims) => println!("dimensions: {dims}"),
        None => println!("dimensions: -"),
    }

    if table.schema().tracks_usage() && !table.is_empty() {
        let usage: Vec<u64> = table.entries().map(|e| e.usage_count).collect();
        let total: u64 = usage.iter().sum();
        let min = usage.iter().min().copied().unwrap_or(0);
        let max = usage.iter().max().copied().unwrap_or(0);
        println!("usage: min {min}, max {max}, total {total}");
    }
}
