//! Data models for the market warehouse.
//!
//! Load-side rows (`dimension`, `time`, `fact`) are built from extracted
//! records; `views` are the typed results of read queries and derive
//! `sqlx::FromRow`.

pub mod dimension;
pub mod fact;
pub mod time;
pub mod views;

pub use dimension::{Dimension, EventRow, MarketRow, NaturalId, SeriesRow, TagRow};
pub use fact::{BridgeRow, FactRow, Metric, METRICS, METRIC_COUNT};
pub use time::TimeRow;
pub use views::{
    CategoryStats, EventDetail, EventSummary, MarketDetail, MarketSummary, MarketVolume,
    SeriesDetail, SeriesSummary, TagMarkets, TagSummary, WarehouseSummary,
};
