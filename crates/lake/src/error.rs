use deltalake::DeltaTableError;
use thiserror::Error;

/// Errors raised by the versioned table store.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] deltalake::arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] deltalake::parquet::errors::ParquetError),

    /// Failure inside the Delta Lake log or write path.
    #[error("delta error: {0}")]
    Delta(#[from] DeltaTableError),

    /// Nothing to write.
    #[error("refusing to write zero records to table '{0}'")]
    EmptyWrite(String),

    /// Table names become directory names, so they are restricted.
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{table}' has no version {version}")]
    VersionNotFound { table: String, version: u64 },

    /// Incoming values cannot be stored in the existing column type.
    #[error("schema conflict on column '{column}': existing {existing}, incoming {incoming}")]
    SchemaConflict {
        column: String,
        existing: String,
        incoming: String,
    },

    /// The table holds something this store never writes.
    #[error("corrupt table: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, LakeError>;
