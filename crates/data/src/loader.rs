//! Star-schema load of landed records.
//!
//! A run executes the stages in a fixed order: `dim_time`, the four entity
//! dimensions, `bridge_market_tag`, then `fact_market_metrics`. A failed
//! stage is recorded and the run continues with whatever the warehouse
//! already holds. A stage whose source tables were not read is skipped,
//! so an unreadable table never empties a rebuilt one.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use market_warehouse_core::{RawRecord, WarehouseConfig};
use serde::Serialize;

use crate::bridge::{derive_links, EventLinks};
use crate::error::{LoadError, Result};
use crate::facts::{FactContext, FactCounters};
use crate::mapping::{map_event, map_market, map_series, map_tag, map_unique, NATURAL_KEY_FIELD};
use crate::models::{BridgeRow, Dimension};
use crate::store::{BatchStage, StageRun, WarehouseStore};
use crate::time_dim::time_rows;

/// Default rows per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Landed records of one source table.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    pub records: Vec<RawRecord>,
    /// Sink version the records were read from; `None` when the table
    /// could not be read.
    pub version: Option<u64>,
}

impl SourceTable {
    #[must_use]
    pub fn new(records: Vec<RawRecord>, version: Option<u64>) -> Self {
        Self { records, version }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

/// Inputs of one load run.
#[derive(Debug, Clone, Default)]
pub struct LoadSources {
    pub series: SourceTable,
    pub tags: SourceTable,
    pub events: SourceTable,
    pub markets: SourceTable,
}

impl LoadSources {
    fn table(&self, name: &str) -> Option<&SourceTable> {
        match name {
            "series" => Some(&self.series),
            "tags" => Some(&self.tags),
            "events" => Some(&self.events),
            "markets" => Some(&self.markets),
            _ => None,
        }
    }

    /// Checkpoint identity of a stage built from `inputs`, such as
    /// `events@3,markets@5,tags@0`.
    ///
    /// # Errors
    /// Returns [`LoadError::Precondition`] naming the first input that was
    /// not read.
    pub fn source_versions(&self, stage: &'static str, inputs: &[&str]) -> Result<String> {
        let mut names = inputs.to_vec();
        names.sort_unstable();
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            match self.table(name).and_then(|t| t.version) {
                Some(version) => parts.push(format!("{name}@{version}")),
                None => {
                    return Err(LoadError::Precondition {
                        stage,
                        reason: format!("source table {name} was not read"),
                    })
                }
            }
        }
        Ok(parts.join(","))
    }
}

/// Source tables the bridge pairs derive from.
const BRIDGE_INPUTS: [&str; 3] = ["events", "markets", "tags"];
/// Source tables the fact rows derive from.
const FACT_INPUTS: [&str; 3] = ["events", "markets", "series"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// Not run because a source table was not read; the target table is
    /// left as it was.
    Skipped,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub status: StageStatus,
    pub source_rows: usize,
    pub inserted: u64,
    /// Records dropped before insert (no key, duplicate, unresolved market).
    pub dropped: usize,
    /// Metric values nulled by their bound.
    pub nulled: usize,
    pub resumed_from: Option<usize>,
    pub error: Option<String>,
}

impl StageReport {
    fn success(stage: &'static str, source_rows: usize, inserted: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            source_rows,
            inserted,
            dropped: 0,
            nulled: 0,
            resumed_from: None,
            error: None,
        }
    }

    fn failed(stage: &'static str, source_rows: usize, error: &LoadError) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            source_rows,
            inserted: 0,
            dropped: 0,
            nulled: 0,
            resumed_from: None,
            error: Some(error.to_string()),
        }
    }

    fn skipped(stage: &'static str, reason: &LoadError) -> Self {
        tracing::warn!(stage, reason = %reason, "Stage skipped");
        Self {
            status: StageStatus::Skipped,
            error: Some(reason.to_string()),
            ..Self::success(stage, 0, 0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub snapshot_date: NaiveDate,
    pub stages: Vec<StageReport>,
}

impl LoadReport {
    /// True when no stage failed; skipped stages do not count as failures.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|s| s.status != StageStatus::Failed)
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// Result of a dimension load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionLoad {
    pub inserted: u64,
    pub dropped: usize,
}

/// Result of a batched stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchLoad {
    pub inserted: u64,
    pub batches: usize,
    pub resumed_from: Option<usize>,
    pub counters: FactCounters,
}

/// Loads records into a [`WarehouseStore`].
#[derive(Debug)]
pub struct Loader<S> {
    store: S,
    batch_size: usize,
    time_start: NaiveDate,
    time_end: NaiveDate,
}

impl<S: WarehouseStore> Loader<S> {
    #[must_use]
    pub fn new(store: S, time_start: NaiveDate, time_end: NaiveDate) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            time_start,
            time_end,
        }
    }

    #[must_use]
    pub fn from_config(store: S, config: &WarehouseConfig) -> Self {
        Self::new(store, config.time_start, config.time_end).with_batch_size(config.batch_size)
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts one `dim_time` row per day of `start..=end`.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn load_dim_time(&self, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        let rows = time_rows(start, end);
        let inserted = self.store.insert_time_rows(&rows).await?;
        tracing::info!(%start, %end, days = rows.len(), inserted, "Loaded dim_time");
        Ok(inserted)
    }

    /// `time_key` of `date`.
    ///
    /// # Errors
    /// Returns [`LoadError::MissingSnapshotKey`] when `dim_time` lacks the date.
    pub async fn snapshot_key(&self, date: NaiveDate) -> Result<i32> {
        self.store
            .time_keys()
            .await?
            .get(&date)
            .copied()
            .ok_or(LoadError::MissingSnapshotKey(date))
    }

    /// Dedups `records` on `natural_key_field`, maps them and inserts the
    /// rows that are not in the dimension yet.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn load_dimension(
        &self,
        dimension: Dimension,
        records: &[RawRecord],
        natural_key_field: &str,
    ) -> Result<DimensionLoad> {
        let (inserted, dropped) = match dimension {
            Dimension::Series => {
                let (rows, dropped) = map_unique(records, natural_key_field, map_series);
                (self.store.insert_series(&rows).await?, dropped)
            }
            Dimension::Tag => {
                let (rows, dropped) = map_unique(records, natural_key_field, map_tag);
                (self.store.insert_tags(&rows).await?, dropped)
            }
            Dimension::Event => {
                let (rows, dropped) = map_unique(records, natural_key_field, map_event);
                (self.store.insert_events(&rows).await?, dropped)
            }
            Dimension::Market => {
                let (rows, dropped) = map_unique(records, natural_key_field, map_market);
                (self.store.insert_markets(&rows).await?, dropped)
            }
        };
        tracing::info!(
            table = dimension.table(),
            records = records.len(),
            dropped,
            inserted,
            "Loaded dimension"
        );
        Ok(DimensionLoad { inserted, dropped })
    }

    /// Derives market-tag pairs from `events` and inserts them.
    ///
    /// # Errors
    /// Returns an error if a batch fails; committed batches stay committed.
    pub async fn load_bridge(
        &self,
        events: &[RawRecord],
        market_keys: &HashMap<String, i32>,
        tag_keys: &HashMap<String, i32>,
        snapshot_key: i32,
        source_versions: &str,
    ) -> Result<BatchLoad> {
        let links = derive_links(events, market_keys, tag_keys);
        self.load_bridge_pairs(&links.pairs, snapshot_key, source_versions).await
    }

    async fn load_bridge_pairs(
        &self,
        pairs: &[BridgeRow],
        snapshot_key: i32,
        source_versions: &str,
    ) -> Result<BatchLoad> {
        let run = StageRun {
            stage: BatchStage::Bridge,
            run_key: snapshot_key,
            source_versions: source_versions.to_string(),
        };
        let start = self.store.begin_stage(&run).await?;
        let mut outcome = BatchLoad {
            resumed_from: (start > 0).then_some(start),
            ..BatchLoad::default()
        };

        for (index, chunk) in pairs.chunks(self.batch_size).enumerate().skip(start) {
            outcome.inserted += self
                .store
                .commit_bridge_batch(&run, index, chunk)
                .await
                .inspect_err(|e| tracing::error!(stage = %run.stage, batch = index, error = %e, "Batch failed"))?;
            outcome.batches += 1;
        }
        self.store.finish_stage(&run).await?;

        tracing::info!(pairs = pairs.len(), inserted = outcome.inserted, "Loaded bridge_market_tag");
        Ok(outcome)
    }

    /// Builds and inserts one fact row per resolvable market record.
    ///
    /// Batches are fixed ranges of `markets`, so a resumed run skips
    /// exactly the batches already committed for the same source versions.
    ///
    /// # Errors
    /// Returns an error if a batch fails; committed batches stay committed.
    pub async fn load_facts(
        &self,
        markets: &[RawRecord],
        context: &FactContext<'_>,
        source_versions: &str,
    ) -> Result<BatchLoad> {
        let run = StageRun {
            stage: BatchStage::Facts,
            run_key: context.snapshot_key,
            source_versions: source_versions.to_string(),
        };
        let start = self.store.begin_stage(&run).await?;
        let mut outcome = BatchLoad {
            resumed_from: (start > 0).then_some(start),
            ..BatchLoad::default()
        };

        for (index, chunk) in markets.chunks(self.batch_size).enumerate().skip(start) {
            let rows: Vec<_> = chunk
                .iter()
                .filter_map(|record| context.build(record, &mut outcome.counters))
                .collect();
            outcome.inserted += self
                .store
                .commit_fact_batch(&run, index, &rows)
                .await
                .inspect_err(|e| tracing::error!(stage = %run.stage, batch = index, error = %e, "Batch failed"))?;
            outcome.batches += 1;
            tracing::debug!(batch = index, rows = rows.len(), "Committed fact batch");
        }
        self.store.finish_stage(&run).await?;

        tracing::info!(
            records = markets.len(),
            inserted = outcome.inserted,
            skipped = outcome.counters.skipped,
            nulled = outcome.counters.nulled,
            "Loaded fact_market_metrics"
        );
        Ok(outcome)
    }

    /// Runs every stage for `snapshot_date`.
    pub async fn run(&self, sources: &LoadSources, snapshot_date: NaiveDate) -> LoadReport {
        let mut stages = Vec::with_capacity(7);

        let start = self.time_start.min(snapshot_date);
        let end = self.time_end.max(snapshot_date);
        let days = time_rows(start, end).len();
        stages.push(match self.load_dim_time(start, end).await {
            Ok(inserted) => StageReport::success("dim_time", days, inserted),
            Err(e) => failed_stage("dim_time", days, &e),
        });

        for (dimension, source) in [
            (Dimension::Series, &sources.series),
            (Dimension::Tag, &sources.tags),
            (Dimension::Event, &sources.events),
            (Dimension::Market, &sources.markets),
        ] {
            if !source.is_available() {
                let reason = LoadError::Precondition {
                    stage: dimension.table(),
                    reason: "source table was not read".to_string(),
                };
                stages.push(StageReport::skipped(dimension.table(), &reason));
                continue;
            }
            let rows = source.records.len();
            stages.push(
                match self.load_dimension(dimension, &source.records, NATURAL_KEY_FIELD).await {
                    Ok(load) => StageReport {
                        dropped: load.dropped,
                        ..StageReport::success(dimension.table(), rows, load.inserted)
                    },
                    Err(e) => failed_stage(dimension.table(), rows, &e),
                },
            );
        }

        let keys = self.resolve_keys(snapshot_date).await;
        let links = match &keys {
            Ok(k) => derive_links(&sources.events.records, &k.markets, &k.tags),
            Err(_) => EventLinks::default(),
        };

        let bridge = BatchStage::Bridge.table();
        let bridge_rows = links.pairs.len();
        stages.push(match (sources.source_versions(bridge, &BRIDGE_INPUTS), &keys) {
            (Err(reason), _) => StageReport::skipped(bridge, &reason),
            (Ok(versions), Ok(k)) => {
                match self.load_bridge_pairs(&links.pairs, k.snapshot, &versions).await {
                    Ok(load) => batch_report(bridge, bridge_rows, &load),
                    Err(e) => failed_stage(bridge, bridge_rows, &e),
                }
            }
            (Ok(_), Err(e)) => failed_stage(bridge, bridge_rows, e),
        });

        let facts = BatchStage::Facts.table();
        let fact_rows = sources.markets.records.len();
        stages.push(match (sources.source_versions(facts, &FACT_INPUTS), &keys) {
            (Err(reason), _) => StageReport::skipped(facts, &reason),
            (Ok(versions), Ok(k)) => {
                let context = FactContext {
                    market_keys: &k.markets,
                    event_keys: &k.events,
                    series_keys: &k.series,
                    time_keys: &k.time,
                    links: &links,
                    snapshot_key: k.snapshot,
                };
                match self
                    .load_facts(&sources.markets.records, &context, &versions)
                    .await
                {
                    Ok(load) => StageReport {
                        dropped: load.counters.skipped,
                        nulled: load.counters.nulled,
                        ..batch_report(facts, fact_rows, &load)
                    },
                    Err(e) => failed_stage(facts, fact_rows, &e),
                }
            }
            (Ok(_), Err(e)) => failed_stage(facts, fact_rows, e),
        });

        let report = LoadReport {
            snapshot_date,
            stages,
        };
        tracing::info!(%snapshot_date, success = report.is_success(), "Load run finished");
        report
    }

    async fn resolve_keys(&self, snapshot_date: NaiveDate) -> Result<ResolvedKeys> {
        let time = self.store.time_keys().await?;
        let snapshot = time
            .get(&snapshot_date)
            .copied()
            .ok_or(LoadError::MissingSnapshotKey(snapshot_date))?;
        Ok(ResolvedKeys {
            snapshot,
            time,
            series: self.store.key_map(Dimension::Series).await?,
            tags: self.store.key_map(Dimension::Tag).await?,
            events: self.store.key_map(Dimension::Event).await?,
            markets: self.store.key_map(Dimension::Market).await?,
        })
    }
}

struct ResolvedKeys {
    snapshot: i32,
    time: HashMap<NaiveDate, i32>,
    series: HashMap<String, i32>,
    tags: HashMap<String, i32>,
    events: HashMap<String, i32>,
    markets: HashMap<String, i32>,
}

fn failed_stage(stage: &'static str, source_rows: usize, error: &LoadError) -> StageReport {
    tracing::error!(stage, error = %error, "Stage failed");
    StageReport::failed(stage, source_rows, error)
}

fn batch_report(stage: &'static str, source_rows: usize, load: &BatchLoad) -> StageReport {
    StageReport {
        resumed_from: load.resumed_from,
        ..StageReport::success(stage, source_rows, load.inserted)
    }
}
