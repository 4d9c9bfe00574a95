//! Aggregate queries over the latest snapshot of each market.

use anyhow::Result;
use sqlx::PgPool;

use super::LATEST_FACT_JOIN;
use crate::models::{CategoryStats, WarehouseSummary};

#[derive(Debug, Clone)]
pub struct AnalyticsRepository {
    pool: PgPool,
}

impl AnalyticsRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Per-category market counts and totals, largest volume first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn category_stats(&self, limit: i64, offset: i64) -> Result<Vec<CategoryStats>> {
        let sql = format!(
            "SELECT COALESCE(m.category, 'uncategorized') AS category,
                    COUNT(*) AS market_count,
                    COUNT(*) FILTER (WHERE m.active = TRUE) AS active_markets,
                    COALESCE(SUM(f.volume), 0) AS total_volume,
                    COALESCE(SUM(f.liquidity), 0) AS total_liquidity,
                    AVG(f.outcome_price_yes) AS avg_price_yes
             FROM dim_market m
             {LATEST_FACT_JOIN}
             WHERE m.is_current = TRUE
             GROUP BY COALESCE(m.category, 'uncategorized')
             ORDER BY total_volume DESC
             LIMIT $1 OFFSET $2"
        );
        let stats = sqlx::query_as::<_, CategoryStats>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(stats)
    }

    /// Warehouse-wide counts and totals.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn summary(&self) -> Result<WarehouseSummary> {
        let sql = format!(
            "SELECT
                (SELECT COUNT(*) FROM dim_market WHERE is_current = TRUE) AS markets,
                (SELECT COUNT(*) FROM dim_market WHERE is_current = TRUE AND active = TRUE) AS active_markets,
                (SELECT COUNT(*) FROM dim_event WHERE is_current = TRUE) AS events,
                (SELECT COUNT(*) FROM dim_series WHERE is_current = TRUE) AS series,
                (SELECT COUNT(*) FROM dim_tag WHERE is_current = TRUE) AS tags,
                (SELECT COUNT(*) FROM fact_market_metrics) AS fact_rows,
                (SELECT COALESCE(SUM(f.volume), 0) FROM dim_market m {LATEST_FACT_JOIN}) AS total_volume,
                (SELECT COALESCE(SUM(f.liquidity), 0) FROM dim_market m {LATEST_FACT_JOIN}) AS total_liquidity,
                (SELECT MAX(t.date_value)
                   FROM fact_market_metrics lf
                   JOIN dim_time t ON t.time_key = lf.snapshot_date_key) AS latest_snapshot"
        );
        let summary = sqlx::query_as::<_, WarehouseSummary>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(summary)
    }
}
