use chrono::{DateTime, Utc};

use crate::clean::{FEE_BOUND, PRICE_BOUND, PRICE_CHANGE_BOUND, VOLUME_BOUND};

/// A bounded numeric metric copied from a market record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    /// Field name in the extracted record.
    pub source: &'static str,
    /// Column in `fact_market_metrics`.
    pub column: &'static str,
    /// Values with `abs(value) >= bound` are stored as NULL.
    pub bound: f64,
}

const fn metric(source: &'static str, column: &'static str, bound: f64) -> Metric {
    Metric {
        source,
        column,
        bound,
    }
}

pub const METRIC_COUNT: usize = 32;

/// Metrics in column order.
pub const METRICS: [Metric; METRIC_COUNT] = [
    metric("liquidity", "liquidity", VOLUME_BOUND),
    metric("liquidityAmm", "liquidity_amm", VOLUME_BOUND),
    metric("liquidityClob", "liquidity_clob", VOLUME_BOUND),
    metric("volume", "volume", VOLUME_BOUND),
    metric("volume24hr", "volume_24hr", VOLUME_BOUND),
    metric("volume1wk", "volume_1wk", VOLUME_BOUND),
    metric("volume1mo", "volume_1mo", VOLUME_BOUND),
    metric("volume1yr", "volume_1yr", VOLUME_BOUND),
    metric("volumeAmm", "volume_amm", VOLUME_BOUND),
    metric("volumeClob", "volume_clob", VOLUME_BOUND),
    metric("volume24hrAmm", "volume_24hr_amm", VOLUME_BOUND),
    metric("volume24hrClob", "volume_24hr_clob", VOLUME_BOUND),
    metric("volume1wkAmm", "volume_1wk_amm", VOLUME_BOUND),
    metric("volume1wkClob", "volume_1wk_clob", VOLUME_BOUND),
    metric("volume1moAmm", "volume_1mo_amm", VOLUME_BOUND),
    metric("volume1moClob", "volume_1mo_clob", VOLUME_BOUND),
    metric("volume1yrAmm", "volume_1yr_amm", VOLUME_BOUND),
    metric("volume1yrClob", "volume_1yr_clob", VOLUME_BOUND),
    metric("openInterest", "open_interest", VOLUME_BOUND),
    metric("lastTradePrice", "last_trade_price", PRICE_BOUND),
    metric("bestBid", "best_bid", PRICE_BOUND),
    metric("bestAsk", "best_ask", PRICE_BOUND),
    metric("spread", "spread", PRICE_BOUND),
    metric("oneHourPriceChange", "price_change_1h", PRICE_CHANGE_BOUND),
    metric("oneDayPriceChange", "price_change_1d", PRICE_CHANGE_BOUND),
    metric("oneWeekPriceChange", "price_change_1wk", PRICE_CHANGE_BOUND),
    metric("oneMonthPriceChange", "price_change_1mo", PRICE_CHANGE_BOUND),
    metric("oneYearPriceChange", "price_change_1yr", PRICE_CHANGE_BOUND),
    metric("fee", "fee", FEE_BOUND),
    metric("takerBaseFee", "taker_base_fee", FEE_BOUND),
    metric("makerBaseFee", "maker_base_fee", FEE_BOUND),
    metric("competitive", "competitive", PRICE_BOUND),
];

/// One row of `fact_market_metrics`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub market_key: i32,
    pub event_key: Option<i32>,
    pub series_key: Option<i32>,
    pub snapshot_date_key: i32,
    pub start_date_key: Option<i32>,
    pub end_date_key: Option<i32>,
    pub closed_date_key: Option<i32>,
    pub outcome_price_yes: Option<f64>,
    pub outcome_price_no: Option<f64>,
    /// Values aligned with [`METRICS`].
    pub metrics: [Option<f64>; METRIC_COUNT],
    pub extraction_timestamp: Option<DateTime<Utc>>,
}

impl FactRow {
    /// Value of the metric stored in `column`.
    #[must_use]
    pub fn metric(&self, column: &str) -> Option<f64> {
        METRICS
            .iter()
            .position(|m| m.column == column)
            .and_then(|i| self.metrics[i])
    }
}

/// One row of `bridge_market_tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeRow {
    pub market_key: i32,
    pub tag_key: i32,
}
