//! `load`: read landed tables from the lake and build the star schema.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use market_warehouse_core::{EntityKind, PipelineConfig};
use market_warehouse_data::{
    LoadReport, LoadSources, Loader, MemoryWarehouse, PgWarehouse, SourceTable, WarehouseStore,
};
use market_warehouse_lake::Lake;

#[derive(Args, Debug, Clone, Default)]
pub struct LoadArgs {
    /// Read this lake version of every table instead of the latest
    #[arg(long, value_name = "VERSION")]
    pub lake_version: Option<u64>,

    /// Snapshot date of the fact rows (default: today, UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub snapshot_date: Option<NaiveDate>,

    /// Run every stage against an in-memory warehouse; nothing is written
    #[arg(long)]
    pub dry_run: bool,
}

/// A lake table that could not be read.
#[derive(Debug, Clone)]
pub struct ReadFailure {
    pub table: &'static str,
    pub error: String,
}

/// Reads one table at `version` (latest when `None`), reporting the
/// version actually read.
async fn read_table(lake: &Lake, kind: EntityKind, version: Option<u64>) -> Result<SourceTable> {
    let table = kind.table_name();
    let version = match version {
        Some(v) => v,
        None => lake.table_info(table).await?.version,
    };
    let records = lake.read(table, Some(version)).await?;
    tracing::info!(table, version, records = records.len(), "Read lake table");
    Ok(SourceTable::new(records, Some(version)))
}

/// Reads the four source tables. A table that cannot be read stays
/// unread, so the stages built from it are skipped, and is returned as a
/// failure.
pub async fn read_sources(lake: &Lake, version: Option<u64>) -> (LoadSources, Vec<ReadFailure>) {
    let mut sources = LoadSources::default();
    let mut failures = Vec::new();
    for kind in EntityKind::all() {
        let table = match read_table(lake, *kind, version).await {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(table = kind.table_name(), error = %e, "Cannot read lake table");
                failures.push(ReadFailure {
                    table: kind.table_name(),
                    error: e.to_string(),
                });
                continue;
            }
        };
        match kind {
            EntityKind::Tags => sources.tags = table,
            EntityKind::Events => sources.events = table,
            EntityKind::Series => sources.series = table,
            EntityKind::Markets => sources.markets = table,
        }
    }
    (sources, failures)
}

async fn load_into<S: WarehouseStore>(
    store: S,
    config: &PipelineConfig,
    sources: &LoadSources,
    snapshot_date: NaiveDate,
) -> LoadReport {
    Loader::from_config(store, &config.warehouse)
        .run(sources, snapshot_date)
        .await
}

/// Loads the lake into the warehouse (or an in-memory one for a dry run).
///
/// # Errors
/// Returns an error if the database cannot be reached.
pub async fn run_load(config: &PipelineConfig, args: &LoadArgs) -> Result<(LoadReport, Vec<ReadFailure>)> {
    let lake = Lake::new(&config.lake.base_dir);
    let (sources, failures) = read_sources(&lake, args.lake_version).await;
    let snapshot_date = args.snapshot_date.unwrap_or_else(|| Utc::now().date_naive());

    let report = if args.dry_run {
        tracing::info!("Dry run: loading into an in-memory warehouse");
        load_into(MemoryWarehouse::new(), config, &sources, snapshot_date).await
    } else {
        config.validate_for_database()?;
        let store = PgWarehouse::connect(
            &config.warehouse.database_url,
            config.warehouse.max_connections,
        )
        .await
        .context("Failed to connect to the warehouse database")?;
        load_into(store, config, &sources, snapshot_date).await
    };
    Ok((report, failures))
}

pub fn print_load_summary(report: &LoadReport, failures: &[ReadFailure]) {
    println!();
    println!("{}", "=".repeat(90));
    println!("LOAD SUMMARY (snapshot {})", report.snapshot_date);
    println!("{}", "=".repeat(90));
    for failure in failures {
        println!("lake table {} unreadable: {}", failure.table, failure.error);
    }
    println!(
        "{:<22} {:>8} {:>10} {:>10} {:>8} {:>8} {:>8}  {}",
        "Stage", "Status", "Source", "Inserted", "Dropped", "Nulled", "Resumed", "Error"
    );
    println!("{}", "-".repeat(90));
    for stage in &report.stages {
        println!(
            "{:<22} {:>8} {:>10} {:>10} {:>8} {:>8} {:>8}  {}",
            stage.stage,
            stage.status.to_string(),
            stage.source_rows,
            stage.inserted,
            stage.dropped,
            stage.nulled,
            stage
                .resumed_from
                .map_or_else(|| "-".to_string(), |b| b.to_string()),
            stage.error.as_deref().unwrap_or("")
        );
    }
    println!("{}", "=".repeat(90));
}

#[cfg(test)]
mod tests {
    use market_warehouse_core::{RawRecord, WriteMode};
    use market_warehouse_data::StageStatus;
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> RawRecord {
        RawRecord::from_json(value).unwrap()
    }

    #[tokio::test]
    async fn test_missing_tables_stay_unread() {
        let dir = tempfile::tempdir().unwrap();
        let lake = Lake::new(dir.path());
        lake.try_write("tags", &[record(json!({"id": "t1"}))], WriteMode::Overwrite)
            .await
            .unwrap();

        let (sources, failures) = read_sources(&lake, None).await;
        assert_eq!(sources.tags.records.len(), 1);
        assert_eq!(sources.tags.version, Some(0));
        assert!(sources.markets.records.is_empty());
        assert!(!sources.markets.is_available());
        let missing: Vec<&str> = failures.iter().map(|f| f.table).collect();
        assert_eq!(missing, vec!["events", "series", "markets"]);
    }

    #[tokio::test]
    async fn test_pinned_version_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let lake = Lake::new(dir.path());
        let first = [record(json!({"id": "m1"}))];
        let second = [record(json!({"id": "m1"})), record(json!({"id": "m2"}))];
        lake.try_write("markets", &first, WriteMode::Overwrite)
            .await
            .unwrap();
        lake.try_write("markets", &second, WriteMode::Overwrite)
            .await
            .unwrap();

        let (latest, _) = read_sources(&lake, None).await;
        assert_eq!(latest.markets.records.len(), 2);
        assert_eq!(latest.markets.version, Some(1));

        let (pinned, _) = read_sources(&lake, Some(0)).await;
        assert_eq!(pinned.markets.records.len(), 1);
        assert_eq!(pinned.markets.version, Some(0));
    }

    #[tokio::test]
    async fn test_dry_run_loads_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.lake.base_dir = dir.path().to_path_buf();
        config.warehouse.time_start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        config.warehouse.time_end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();

        let lake = Lake::new(dir.path());
        let markets = [record(json!({"id": "m1", "question": "Q?", "volume": "10.5"}))];
        lake.try_write("markets", &markets, WriteMode::Overwrite)
            .await
            .unwrap();

        let args = LoadArgs {
            snapshot_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            dry_run: true,
            ..LoadArgs::default()
        };
        let (report, failures) = run_load(&config, &args).await.unwrap();
        assert_eq!(failures.len(), 3);
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.stage("dim_market").unwrap().inserted, 1);
        assert_eq!(
            report.stage("fact_market_metrics").unwrap().status,
            StageStatus::Skipped
        );

        for (table, record) in [
            ("events", json!({"id": "e1", "markets": [{"id": "m1"}]})),
            ("series", json!({"id": "s1"})),
            ("tags", json!({"id": "t1"})),
        ] {
            lake.try_write(table, &[RawRecord::from_json(record).unwrap()], WriteMode::Overwrite)
                .await
                .unwrap();
        }
        let (report, failures) = run_load(&config, &args).await.unwrap();
        assert!(failures.is_empty());
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.stage("fact_market_metrics").unwrap().inserted, 1);
    }
}
