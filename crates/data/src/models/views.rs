//! Read models returned by the query repositories.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarketSummary {
    pub market_id: String,
    pub question: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub end_date: Option<DateTime<Utc>>,
}

/// A market ranked by traded volume in its latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarketVolume {
    pub market_id: String,
    pub question: Option<String>,
    pub category: Option<String>,
    pub volume: Decimal,
    pub volume_24hr: Decimal,
    pub liquidity: Decimal,
    pub outcome_price_yes: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarketDetail {
    pub market_id: String,
    pub condition_id: Option<String>,
    pub question: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub market_type: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub closed_time: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub outcomes: Option<serde_json::Value>,
    pub event_id: Option<String>,
    pub snapshot_date: Option<NaiveDate>,
    pub volume: Option<Decimal>,
    pub volume_24hr: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub outcome_price_yes: Option<Decimal>,
    pub outcome_price_no: Option<Decimal>,
    pub last_trade_price: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    #[sqlx(skip)]
    pub tags: Vec<TagSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventSummary {
    pub event_id: String,
    pub ticker: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventDetail {
    pub event_id: String,
    pub ticker: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub featured: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub series_slug: Option<String>,
    pub market_count: i64,
    pub total_volume: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeriesSummary {
    pub series_id: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub series_type: Option<String>,
    pub recurrence: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeriesDetail {
    pub series_id: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub series_type: Option<String>,
    pub recurrence: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub market_count: i64,
    pub total_volume: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagSummary {
    pub tag_id: String,
    pub label: Option<String>,
    pub slug: Option<String>,
    pub level: Option<i32>,
}

/// Markets carrying one tag, paginated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMarkets {
    pub tag: TagSummary,
    pub total: i64,
    pub markets: Vec<MarketSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryStats {
    pub category: String,
    pub market_count: i64,
    pub active_markets: i64,
    pub total_volume: Decimal,
    pub total_liquidity: Decimal,
    pub avg_price_yes: Option<Decimal>,
}

/// Warehouse-wide totals.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WarehouseSummary {
    pub markets: i64,
    pub active_markets: i64,
    pub events: i64,
    pub series: i64,
    pub tags: i64,
    pub fact_rows: i64,
    pub total_volume: Decimal,
    pub total_liquidity: Decimal,
    pub latest_snapshot: Option<NaiveDate>,
}
