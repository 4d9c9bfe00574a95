use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while loading the warehouse.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The time dimension has no row for the run's snapshot date.
    #[error("no dim_time row for snapshot date {0}")]
    MissingSnapshotKey(NaiveDate),

    /// A stage depends on data an earlier stage failed to provide.
    #[error("stage '{stage}' cannot run: {reason}")]
    Precondition { stage: &'static str, reason: String },

    /// Failure reported by a non-database store.
    #[error("store error: {0}")]
    Store(String),
}

impl LoadError {
    /// True for connection-level failures that may clear on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
        )
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
