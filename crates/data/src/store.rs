//! The storage seam between the loader and the warehouse.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{BridgeRow, Dimension, EventRow, FactRow, MarketRow, SeriesRow, TagRow, TimeRow};

/// A stage that rebuilds its table batch by batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchStage {
    Bridge,
    Facts,
}

impl BatchStage {
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge_market_tag",
            Self::Facts => "fact_market_metrics",
        }
    }
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Identity of one batched stage run, used to match checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun {
    pub stage: BatchStage,
    /// `time_key` of the snapshot date.
    pub run_key: i32,
    /// Sink versions of every source table the stage's rows derive from,
    /// e.g. `events@3,markets@5,tags@0`.
    pub source_versions: String,
}

/// Checkpoint row of a batched stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub run_key: i32,
    pub source_versions: String,
    /// Index of the last committed batch, `-1` before the first.
    pub last_batch: i32,
    pub completed: bool,
}

impl Checkpoint {
    /// Batch index to resume `run` from, if this checkpoint belongs to an
    /// unfinished attempt of the same run.
    #[must_use]
    pub fn resume_point(&self, run: &StageRun) -> Option<usize> {
        let same_run = self.run_key == run.run_key && self.source_versions == run.source_versions;
        if same_run && !self.completed {
            usize::try_from(self.last_batch + 1).ok()
        } else {
            None
        }
    }
}

/// Warehouse operations used by the loader.
///
/// Dimension inserts skip rows whose natural id already exists and return
/// the number of rows actually inserted.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    async fn insert_time_rows(&self, rows: &[TimeRow]) -> Result<u64>;

    async fn insert_series(&self, rows: &[SeriesRow]) -> Result<u64>;

    async fn insert_tags(&self, rows: &[TagRow]) -> Result<u64>;

    async fn insert_events(&self, rows: &[EventRow]) -> Result<u64>;

    async fn insert_markets(&self, rows: &[MarketRow]) -> Result<u64>;

    /// Natural id to surrogate key for one dimension.
    async fn key_map(&self, dimension: Dimension) -> Result<HashMap<String, i32>>;

    /// Calendar date to `time_key`.
    async fn time_keys(&self) -> Result<HashMap<NaiveDate, i32>>;

    /// Prepares a batched stage and returns the first batch index to run.
    ///
    /// Resumes after the last committed batch when an unfinished checkpoint
    /// of the same run exists; otherwise empties the target table and
    /// starts from 0.
    async fn begin_stage(&self, run: &StageRun) -> Result<usize>;

    /// Inserts one bridge batch and advances the checkpoint atomically.
    async fn commit_bridge_batch(&self, run: &StageRun, batch: usize, rows: &[BridgeRow]) -> Result<u64>;

    /// Inserts one fact batch and advances the checkpoint atomically.
    async fn commit_fact_batch(&self, run: &StageRun, batch: usize, rows: &[FactRow]) -> Result<u64>;

    async fn finish_stage(&self, run: &StageRun) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_point() {
        let run = StageRun {
            stage: BatchStage::Facts,
            run_key: 10,
            source_versions: "events@1,markets@3,series@0".to_string(),
        };
        let checkpoint = Checkpoint {
            run_key: 10,
            source_versions: run.source_versions.clone(),
            last_batch: 1,
            completed: false,
        };
        assert_eq!(checkpoint.resume_point(&run), Some(2));
        assert_eq!(
            Checkpoint { completed: true, ..checkpoint.clone() }.resume_point(&run),
            None
        );
        // a new version of any input invalidates the checkpoint
        assert_eq!(
            Checkpoint {
                source_versions: "events@2,markets@3,series@0".to_string(),
                ..checkpoint.clone()
            }
            .resume_point(&run),
            None
        );
        assert_eq!(
            Checkpoint { last_batch: -1, ..checkpoint }.resume_point(&run),
            Some(0)
        );
    }
}
