//! Market queries.

use anyhow::Result;
use sqlx::PgPool;

use super::{like_pattern, LATEST_FACT_JOIN};
use crate::models::{MarketDetail, MarketSummary, MarketVolume, TagSummary};

const SUMMARY_COLUMNS: &str = "m.market_id, m.question, m.slug, m.category, m.subcategory, \
                               m.active, m.closed, m.end_date";

/// Repository for `dim_market` and its latest metrics.
#[derive(Debug, Clone)]
pub struct MarketRepository {
    pool: PgPool,
}

impl MarketRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current markets, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<MarketSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS}
             FROM dim_market m
             WHERE m.is_current = TRUE
             ORDER BY m.market_key DESC
             LIMIT $1 OFFSET $2"
        );
        let markets = sqlx::query_as::<_, MarketSummary>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(markets)
    }

    /// Active markets ranked by volume, optionally within one category.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn top_volume(&self, category: Option<&str>, limit: i64, offset: i64) -> Result<Vec<MarketVolume>> {
        let sql = format!(
            "SELECT m.market_id, m.question, m.category,
                    COALESCE(f.volume, 0) AS volume,
                    COALESCE(f.volume_24hr, 0) AS volume_24hr,
                    COALESCE(f.liquidity, 0) AS liquidity,
                    f.outcome_price_yes
             FROM dim_market m
             {LATEST_FACT_JOIN}
             WHERE m.is_current = TRUE
               AND m.active = TRUE
               AND ($1::TEXT IS NULL OR m.category = $1)
             ORDER BY COALESCE(f.volume, 0) DESC, m.market_key
             LIMIT $2 OFFSET $3"
        );
        let markets = sqlx::query_as::<_, MarketVolume>(&sql)
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(markets)
    }

    /// Case-insensitive substring search over questions; active markets first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn search(&self, term: &str, limit: i64, offset: i64) -> Result<Vec<MarketSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS}
             FROM dim_market m
             WHERE m.is_current = TRUE
               AND m.question ILIKE $1
             ORDER BY CASE WHEN m.active = TRUE THEN 0 ELSE 1 END, m.market_key DESC
             LIMIT $2 OFFSET $3"
        );
        let markets = sqlx::query_as::<_, MarketSummary>(&sql)
            .bind(like_pattern(term))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(markets)
    }

    /// One market with its latest metrics and tags.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, market_id: &str) -> Result<Option<MarketDetail>> {
        let sql = format!(
            "SELECT m.market_id, m.condition_id, m.question, m.slug, m.description,
                    m.category, m.subcategory, m.market_type, m.active, m.closed,
                    m.start_date, m.end_date, m.closed_time, m.image, m.outcomes,
                    e.event_id, t.date_value AS snapshot_date,
                    f.volume, f.volume_24hr, f.liquidity,
                    f.outcome_price_yes, f.outcome_price_no, f.last_trade_price,
                    f.best_bid, f.best_ask, f.spread
             FROM dim_market m
             {LATEST_FACT_JOIN}
             LEFT JOIN dim_event e ON e.event_key = f.event_key
             LEFT JOIN dim_time t ON t.time_key = f.snapshot_date_key
             WHERE m.market_id = $1
               AND m.is_current = TRUE"
        );
        let Some(mut market) = sqlx::query_as::<_, MarketDetail>(&sql)
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        market.tags = sqlx::query_as::<_, TagSummary>(
            r"
            SELECT t.tag_id, t.label, t.slug, t.level
            FROM bridge_market_tag b
            JOIN dim_market m ON m.market_key = b.market_key
            JOIN dim_tag t ON t.tag_key = b.tag_key
            WHERE m.market_id = $1
            ORDER BY t.label
            ",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(market))
    }
}
