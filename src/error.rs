//! Embestore error types

/// Table shape violations.
///
/// Raised when a persisted file or an in-flight batch does not have the
/// column layout the store expects.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("unexpected column: {0}")]
    UnexpectedColumn(String),

    #[error("column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: String,
        found: String,
    },

    #[error("null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("column '{column}' has {found} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),
}

/// Embestore error types
#[derive(Debug, thiserror::Error)]
pub enum EmbestoreError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Table shape errors
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Opaque failure from the embedding provider. Never retried here.
    #[error("embedding provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The provider broke its contract of one vector per input text.
    #[error("embedding provider returned {returned} vectors for {expected} texts")]
    ProviderContract { expected: usize, returned: usize },

    // Storage errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "parquet")]
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[cfg(feature = "parquet")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl EmbestoreError {
    /// Wrap any provider-side error as an opaque [`EmbestoreError::Provider`].
    pub fn provider(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Provider(err.into())
    }

    /// Whether this error came from bad construction arguments.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether this error is a table shape violation.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Whether this error originated in the embedding provider.
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::ProviderContract { .. })
    }
}

/// Result type alias for Embestore operations
pub type Result<T> = std::result::Result<T, EmbestoreError>;
