//! Versioned columnar table store.
//!
//! Every table is a Delta Lake table under a base directory: Snappy
//! Parquet data files plus the `_delta_log` commit log, so every write
//! produces a new readable version and older versions stay reconstructable.

pub mod convert;
pub mod error;
pub mod schema;
pub mod table;

pub use error::{LakeError, Result};
pub use schema::{ColumnSpec, ColumnType, EXTRACTION_DATE, EXTRACTION_TIMESTAMP};
pub use table::{
    ColumnStats, CommitSummary, FileInfo, Lake, TableInfo, TableStats, WriteOutcome,
    HISTORY_LIMIT, LOG_DIR,
};
