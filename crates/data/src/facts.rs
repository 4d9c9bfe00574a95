//! Fact rows built from market records.

use std::collections::HashMap;

use chrono::NaiveDate;
use market_warehouse_core::RawRecord;

use crate::bridge::{nested_refs, EventLinks};
use crate::clean::{clean_date, clean_numeric_checked, clean_timestamp, outcome_prices, Rejection};
use crate::mapping::NATURAL_KEY_FIELD;
use crate::models::{FactRow, METRICS, METRIC_COUNT};

/// Field the sink stamps on every landed record.
pub const EXTRACTION_TIMESTAMP_FIELD: &str = "_extraction_timestamp";

/// Running totals for one fact build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactCounters {
    /// Records whose market key did not resolve.
    pub skipped: usize,
    /// Metric values dropped for exceeding their bound.
    pub nulled: usize,
    /// Metric values dropped as unparseable.
    pub unparseable: usize,
}

/// Key lookups needed to turn a market record into a fact row.
#[derive(Debug, Clone, Copy)]
pub struct FactContext<'a> {
    pub market_keys: &'a HashMap<String, i32>,
    pub event_keys: &'a HashMap<String, i32>,
    pub series_keys: &'a HashMap<String, i32>,
    pub time_keys: &'a HashMap<NaiveDate, i32>,
    pub links: &'a EventLinks,
    pub snapshot_key: i32,
}

impl FactContext<'_> {
    /// Builds the fact row for `record`, or `None` when its market is unknown.
    pub fn build(&self, record: &RawRecord, counters: &mut FactCounters) -> Option<FactRow> {
        let Some(market_key) = record
            .natural_key(NATURAL_KEY_FIELD)
            .and_then(|id| self.market_keys.get(&id).copied())
        else {
            counters.skipped += 1;
            return None;
        };

        let event_id = self.event_id(record);
        let event_key = event_id.as_ref().and_then(|id| self.event_keys.get(id).copied());
        let series_key = event_id
            .as_deref()
            .and_then(|id| self.links.series_of(id))
            .and_then(|id| self.series_keys.get(id).copied());

        let mut metrics = [None; METRIC_COUNT];
        for (slot, metric) in metrics.iter_mut().zip(METRICS.iter()) {
            *slot = match clean_numeric_checked(record.get(metric.source), metric.bound) {
                Ok(value) => value,
                Err(Rejection::OutOfBounds) => {
                    counters.nulled += 1;
                    None
                }
                Err(Rejection::Unparseable) => {
                    counters.unparseable += 1;
                    None
                }
            };
        }

        let (outcome_price_yes, outcome_price_no) = outcome_prices(record.get("outcomePrices"));

        Some(FactRow {
            market_key,
            event_key,
            series_key,
            snapshot_date_key: self.snapshot_key,
            start_date_key: self.date_key(record, "startDate"),
            end_date_key: self.date_key(record, "endDate"),
            closed_date_key: self.date_key(record, "closedTime"),
            outcome_price_yes,
            outcome_price_no,
            metrics,
            extraction_timestamp: clean_timestamp(record.get(EXTRACTION_TIMESTAMP_FIELD)),
        })
    }

    /// The market's own first event, else the first event listing it.
    fn event_id(&self, record: &RawRecord) -> Option<String> {
        nested_refs(record, "events").into_iter().next().or_else(|| {
            record
                .natural_key(NATURAL_KEY_FIELD)
                .and_then(|id| self.links.event_of(&id).map(str::to_string))
        })
    }

    fn date_key(&self, record: &RawRecord, field: &str) -> Option<i32> {
        clean_date(record.get(field)).and_then(|d| self.time_keys.get(&d).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        markets: HashMap<String, i32>,
        events: HashMap<String, i32>,
        series: HashMap<String, i32>,
        times: HashMap<NaiveDate, i32>,
        links: EventLinks,
    }

    impl Fixture {
        fn new() -> Self {
            let mut links = EventLinks::default();
            links.market_events.insert("m2".into(), "e9".into());
            links.event_series.insert("e1".into(), "s1".into());
            Self {
                markets: [("m1".to_string(), 1), ("m2".to_string(), 2)].into(),
                events: [("e1".to_string(), 100), ("e9".to_string(), 900)].into(),
                series: [("s1".to_string(), 7)].into(),
                times: [(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(), 42)].into(),
                links,
            }
        }

        fn context(&self) -> FactContext<'_> {
            FactContext {
                market_keys: &self.markets,
                event_keys: &self.events,
                series_keys: &self.series,
                time_keys: &self.times,
                links: &self.links,
                snapshot_key: 5,
            }
        }
    }

    fn record(value: serde_json::Value) -> RawRecord {
        RawRecord::from_json(value).unwrap()
    }

    #[test]
    fn test_fact_row_resolution_and_bounds() {
        let fixture = Fixture::new();
        let mut counters = FactCounters::default();
        let row = fixture
            .context()
            .build(
                &record(json!({
                    "id": "m1",
                    "events": [{"id": "e1"}],
                    "endDate": "2025-01-31T12:00:00Z",
                    "volume": "15000000000",
                    "liquidity": "42.5",
                    "bestBid": 0.45,
                    "spread": "wide",
                    "outcomePrices": "[\"0.6\", \"0.4\"]",
                    "_extraction_timestamp": "2025-01-20T08:00:00.000000Z"
                })),
                &mut counters,
            )
            .unwrap();

        assert_eq!(row.market_key, 1);
        assert_eq!(row.event_key, Some(100));
        assert_eq!(row.series_key, Some(7));
        assert_eq!(row.snapshot_date_key, 5);
        assert_eq!(row.end_date_key, Some(42));
        assert_eq!(row.start_date_key, None);
        assert_eq!(row.metric("volume"), None);
        assert_eq!(row.metric("liquidity"), Some(42.5));
        assert_eq!(row.metric("best_bid"), Some(0.45));
        assert_eq!((row.outcome_price_yes, row.outcome_price_no), (Some(0.6), Some(0.4)));
        assert!(row.extraction_timestamp.is_some());
        assert_eq!(counters.nulled, 1);
        assert_eq!(counters.unparseable, 1);
    }

    #[test]
    fn test_event_falls_back_to_links() {
        let fixture = Fixture::new();
        let mut counters = FactCounters::default();
        let row = fixture
            .context()
            .build(&record(json!({"id": "m2"})), &mut counters)
            .unwrap();
        assert_eq!(row.event_key, Some(900));
        assert_eq!(row.series_key, None);
    }

    #[test]
    fn test_unknown_market_is_skipped() {
        let fixture = Fixture::new();
        let mut counters = FactCounters::default();
        assert!(fixture
            .context()
            .build(&record(json!({"id": "nope"})), &mut counters)
            .is_none());
        assert_eq!(counters.skipped, 1);
    }
}
