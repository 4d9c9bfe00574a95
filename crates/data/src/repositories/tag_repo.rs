use anyhow::Result;
use sqlx::PgPool;

use crate::models::{MarketSummary, TagMarkets, TagSummary};

/// Repository for `dim_tag` and the market-tag bridge.
#[derive(Debug, Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current tags ordered by level and label.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<TagSummary>> {
        let tags = sqlx::query_as::<_, TagSummary>(
            r"
            SELECT tag_id, label, slug, level
            FROM dim_tag
            WHERE is_current = TRUE
            ORDER BY level ASC, label ASC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    /// A page of the markets carrying `tag_id`, or `None` for an unknown tag.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn markets(&self, tag_id: &str, limit: i64, offset: i64) -> Result<Option<TagMarkets>> {
        let Some(tag) = sqlx::query_as::<_, TagSummary>(
            "SELECT tag_id, label, slug, level FROM dim_tag WHERE tag_id = $1 AND is_current = TRUE",
        )
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(DISTINCT b.market_key)
            FROM bridge_market_tag b
            JOIN dim_tag t ON t.tag_key = b.tag_key
            WHERE t.tag_id = $1
            ",
        )
        .bind(tag_id)
        .fetch_one(&self.pool)
        .await?;

        let markets = sqlx::query_as::<_, MarketSummary>(
            r"
            SELECT m.market_id, m.question, m.slug, m.category, m.subcategory,
                   m.active, m.closed, m.end_date
            FROM dim_market m
            JOIN bridge_market_tag b ON b.market_key = m.market_key
            JOIN dim_tag t ON t.tag_key = b.tag_key
            WHERE t.tag_id = $1
              AND m.is_current = TRUE
            ORDER BY m.market_key DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(tag_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(TagMarkets { tag, total, markets }))
    }
}
