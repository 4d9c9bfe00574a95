use anyhow::Result;
use sqlx::PgPool;

use crate::models::{EventDetail, EventSummary};

/// Repository for `dim_event`.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current events, optionally only active ones.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self, active_only: bool, limit: i64, offset: i64) -> Result<Vec<EventSummary>> {
        let events = sqlx::query_as::<_, EventSummary>(
            r"
            SELECT event_id, ticker, slug, title, category, active, closed, start_date, end_date
            FROM dim_event
            WHERE is_current = TRUE
              AND (NOT $1 OR active = TRUE)
            ORDER BY event_key DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(active_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// One event with the number and volume of markets in its latest snapshot.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, event_id: &str) -> Result<Option<EventDetail>> {
        let event = sqlx::query_as::<_, EventDetail>(
            r"
            SELECT e.event_id, e.ticker, e.slug, e.title, e.description, e.category,
                   e.subcategory, e.active, e.closed, e.featured, e.start_date, e.end_date,
                   e.series_slug,
                   COUNT(DISTINCT f.market_key) AS market_count,
                   SUM(f.volume) AS total_volume
            FROM dim_event e
            LEFT JOIN fact_market_metrics f
                   ON f.event_key = e.event_key
                  AND f.snapshot_date_key = (SELECT MAX(snapshot_date_key) FROM fact_market_metrics)
            WHERE e.event_id = $1
              AND e.is_current = TRUE
            GROUP BY e.event_key
            ",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }
}
