use chrono::NaiveDate;
use market_warehouse_core::RawRecord;
use market_warehouse_data::{
    BatchStage, Dimension, LoadError, LoadSources, Loader, MemoryWarehouse, SourceTable, StageStatus,
};
use serde_json::json;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn records(values: Vec<serde_json::Value>) -> Vec<RawRecord> {
    values
        .into_iter()
        .map(|v| RawRecord::from_json(v).unwrap())
        .collect()
}

fn loader() -> Loader<MemoryWarehouse> {
    Loader::new(MemoryWarehouse::new(), date(2025, 1, 1), date(2025, 1, 31))
}

fn sample_sources() -> LoadSources {
    LoadSources {
        series: SourceTable::new(
            records(vec![json!({"id": "s1", "title": "Weekly"})]),
            Some(0),
        ),
        tags: SourceTable::new(
            records(vec![
                json!({"id": "t1", "label": "Crypto", "slug": "crypto"}),
                json!({"id": "t1", "label": "Crypto again"}),
                json!({"id": "t2", "label": "Politics"}),
            ]),
            Some(0),
        ),
        events: SourceTable::new(
            records(vec![
                json!({
                    "id": "e1",
                    "title": "BTC price",
                    "tags": [{"id": "t1"}],
                    "markets": [{"id": "m1"}, {"id": "m2"}],
                    "series": [{"id": "s1"}]
                }),
                json!({
                    "id": "e2",
                    "title": "Election",
                    "tags": "[{'id': 't1'}, {'id': 't2'}]",
                    "markets": "[{'id': 'm2'}, {'id': 'm3'}]"
                }),
            ]),
            Some(3),
        ),
        markets: SourceTable::new(
            records(vec![
                json!({"id": "m1", "question": "BTC > 100k?", "volume": "2500.5",
                       "outcomePrices": "[\"0.7\", \"0.3\"]", "endDate": "2025-01-20T00:00:00Z"}),
                json!({"id": "m2", "question": "BTC > 200k?", "volume": "15000000000"}),
                json!({"id": "m3", "question": "Incumbent wins?", "liquidity": 1200}),
                json!({"question": "no id"}),
            ]),
            Some(5),
        ),
    }
}

#[tokio::test]
async fn test_full_run_builds_star_schema() {
    let loader = loader();
    let report = loader.run(&sample_sources(), date(2025, 1, 15)).await;

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.stage("dim_time").unwrap().inserted, 31);
    assert_eq!(report.stage("dim_tag").unwrap().inserted, 2);
    assert_eq!(report.stage("dim_tag").unwrap().dropped, 1);
    assert_eq!(report.stage("dim_market").unwrap().inserted, 3);
    assert_eq!(report.stage("dim_market").unwrap().dropped, 1);

    let store = loader.store();
    assert_eq!(store.row_count(Dimension::Series).await, 1);
    // m1-t1, m2-t1, m2-t2, m3-t1, m3-t2; m2-t1 appears in both events
    assert_eq!(store.bridge_rows().await.len(), 5);
    assert_eq!(report.stage("bridge_market_tag").unwrap().inserted, 5);

    let facts = store.fact_rows().await;
    assert_eq!(facts.len(), 3);
    let facts_stage = report.stage("fact_market_metrics").unwrap();
    assert_eq!(facts_stage.dropped, 1);
    assert_eq!(facts_stage.nulled, 1);

    let m1 = &facts[0];
    assert_eq!(m1.metric("volume"), Some(2500.5));
    assert_eq!(m1.outcome_price_yes, Some(0.7));
    assert!(m1.end_date_key.is_some());
    assert!(m1.event_key.is_some());
    assert!(m1.series_key.is_some());
    assert_eq!(facts[1].metric("volume"), None);
}

#[tokio::test]
async fn test_dimensions_are_insert_only() {
    let loader = loader();
    let sources = sample_sources();
    loader.run(&sources, date(2025, 1, 15)).await;
    let second = loader.run(&sources, date(2025, 1, 15)).await;

    assert!(second.is_success());
    for table in ["dim_time", "dim_series", "dim_tag", "dim_event", "dim_market"] {
        assert_eq!(second.stage(table).unwrap().inserted, 0, "{table}");
    }
    assert_eq!(loader.store().fact_rows().await.len(), 3);
}

#[tokio::test]
async fn test_failed_fact_batch_resumes_after_last_commit() {
    let loader = loader().with_batch_size(1);
    let sources = sample_sources();
    loader
        .store()
        .fail_batch_once(BatchStage::Facts, 2)
        .await;

    let first = loader.run(&sources, date(2025, 1, 15)).await;
    let facts = first.stage("fact_market_metrics").unwrap();
    assert_eq!(facts.status, StageStatus::Failed);
    assert!(!first.is_success());
    assert_eq!(loader.store().fact_rows().await.len(), 2);
    assert_eq!(
        loader.store().checkpoint(BatchStage::Facts).await.unwrap().last_batch,
        1
    );

    let second = loader.run(&sources, date(2025, 1, 15)).await;
    assert!(second.is_success());
    assert_eq!(
        second.stage("fact_market_metrics").unwrap().resumed_from,
        Some(2)
    );
    assert_eq!(loader.store().fact_rows().await.len(), 3);

    let fact_calls: Vec<usize> = loader
        .store()
        .batch_calls()
        .await
        .into_iter()
        .filter(|(stage, _)| *stage == BatchStage::Facts)
        .map(|(_, batch)| batch)
        .collect();
    assert_eq!(fact_calls, vec![0, 1, 2, 2, 3]);
}

#[tokio::test]
async fn test_new_source_version_starts_over() {
    let loader = loader().with_batch_size(1);
    let mut sources = sample_sources();
    loader
        .store()
        .fail_batch_once(BatchStage::Facts, 1)
        .await;
    loader.run(&sources, date(2025, 1, 15)).await;

    sources.markets.version = Some(6);
    let second = loader.run(&sources, date(2025, 1, 15)).await;
    assert_eq!(
        second.stage("fact_market_metrics").unwrap().resumed_from,
        None
    );
    assert_eq!(loader.store().fact_rows().await.len(), 3);
}

#[tokio::test]
async fn test_snapshot_key_requires_time_row() {
    let loader = loader();
    assert!(matches!(
        loader.snapshot_key(date(2030, 1, 1)).await,
        Err(LoadError::MissingSnapshotKey(_))
    ));

    loader.load_dim_time(date(2030, 1, 1), date(2030, 1, 2)).await.unwrap();
    assert!(loader.snapshot_key(date(2030, 1, 1)).await.is_ok());
}

#[tokio::test]
async fn test_snapshot_outside_range_extends_time_dimension() {
    let loader = loader();
    let report = loader.run(&LoadSources::default(), date(2025, 2, 2)).await;
    assert!(report.is_success());
    assert_eq!(report.stage("dim_time").unwrap().status, StageStatus::Success);
    assert_eq!(
        report.stage("fact_market_metrics").unwrap().status,
        StageStatus::Skipped
    );
    assert_eq!(loader.store().time_row_count().await, 33);
}

#[tokio::test]
async fn test_unread_source_keeps_rebuilt_tables() {
    let loader = loader();
    let mut sources = sample_sources();
    loader.run(&sources, date(2025, 1, 15)).await;

    sources.markets = SourceTable::default();
    let report = loader.run(&sources, date(2025, 1, 15)).await;
    assert!(report.is_success(), "{report:?}");
    for table in ["dim_market", "bridge_market_tag", "fact_market_metrics"] {
        assert_eq!(report.stage(table).unwrap().status, StageStatus::Skipped, "{table}");
    }
    assert_eq!(report.stage("dim_event").unwrap().status, StageStatus::Success);
    assert_eq!(loader.store().fact_rows().await.len(), 3);
    assert_eq!(loader.store().bridge_rows().await.len(), 5);

    let mut sources = sample_sources();
    sources.events = SourceTable::default();
    let report = loader.run(&sources, date(2025, 1, 15)).await;
    let bridge = report.stage("bridge_market_tag").unwrap();
    assert_eq!(bridge.status, StageStatus::Skipped);
    assert!(bridge.error.as_deref().unwrap().contains("events"));
    assert_eq!(loader.store().bridge_rows().await.len(), 5);
    assert_eq!(loader.store().fact_rows().await.len(), 3);
}

#[tokio::test]
async fn test_bridge_resume_requires_same_market_version() {
    let loader = loader().with_batch_size(1);
    let full = sample_sources();
    let mut first_sources = sample_sources();
    first_sources.markets = SourceTable::new(
        records(vec![json!({"id": "m2", "question": "BTC > 200k?"})]),
        Some(5),
    );
    loader
        .store()
        .fail_batch_once(BatchStage::Bridge, 1)
        .await;
    let first = loader.run(&first_sources, date(2025, 1, 15)).await;
    assert_eq!(
        first.stage("bridge_market_tag").unwrap().status,
        StageStatus::Failed
    );
    assert_eq!(loader.store().bridge_rows().await.len(), 1);

    // events are unchanged; the new market version shifts the pair list
    let second = loader.run(&full, date(2025, 1, 15)).await;
    assert!(second.is_success(), "{second:?}");
    assert_eq!(
        second.stage("bridge_market_tag").unwrap().resumed_from,
        None
    );
    assert_eq!(loader.store().bridge_rows().await.len(), 5);

    let bridge_calls: Vec<usize> = loader
        .store()
        .batch_calls()
        .await
        .into_iter()
        .filter(|(stage, _)| *stage == BatchStage::Bridge)
        .map(|(_, batch)| batch)
        .collect();
    assert_eq!(bridge_calls, vec![0, 1, 0, 1, 2, 3, 4]);
}

#[test]
fn test_source_versions_name_every_input() {
    let sources = sample_sources();
    assert_eq!(
        sources
            .source_versions("bridge_market_tag", &["tags", "markets", "events"])
            .unwrap(),
        "events@3,markets@5,tags@0"
    );

    let unread = LoadSources {
        series: SourceTable::default(),
        ..sample_sources()
    };
    assert!(matches!(
        unread.source_versions("fact_market_metrics", &["events", "markets", "series"]),
        Err(LoadError::Precondition { stage: "fact_market_metrics", .. })
    ));
}
