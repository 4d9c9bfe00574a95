use anyhow::Result;
use sqlx::PgPool;

use crate::models::{SeriesDetail, SeriesSummary};

/// Repository for `dim_series`.
#[derive(Debug, Clone)]
pub struct SeriesRepository {
    pool: PgPool,
}

impl SeriesRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<SeriesSummary>> {
        let series = sqlx::query_as::<_, SeriesSummary>(
            r"
            SELECT series_id, slug, title, series_type, recurrence, active, closed
            FROM dim_series
            WHERE is_current = TRUE
            ORDER BY series_key DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(series)
    }

    /// One series with totals over the markets of its events.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, series_id: &str) -> Result<Option<SeriesDetail>> {
        let series = sqlx::query_as::<_, SeriesDetail>(
            r"
            SELECT s.series_id, s.slug, s.title, s.description, s.series_type, s.recurrence,
                   s.active, s.closed, s.start_date,
                   COUNT(DISTINCT f.market_key) AS market_count,
                   SUM(f.volume) AS total_volume
            FROM dim_series s
            LEFT JOIN fact_market_metrics f
                   ON f.series_key = s.series_key
                  AND f.snapshot_date_key = (SELECT MAX(snapshot_date_key) FROM fact_market_metrics)
            WHERE s.series_id = $1
              AND s.is_current = TRUE
            GROUP BY s.series_key
            ",
        )
        .bind(series_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(series)
    }
}
