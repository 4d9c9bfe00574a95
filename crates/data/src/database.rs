//! PostgreSQL implementation of [`WarehouseStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::Result;
use crate::models::{
    BridgeRow, Dimension, EventRow, FactRow, MarketRow, SeriesRow, TagRow, TimeRow, METRICS,
};
use crate::store::{Checkpoint, StageRun, WarehouseStore};

/// Bundled warehouse DDL.
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Postgres caps one statement at 65535 bind parameters.
const BIND_LIMIT: usize = 65_535;

const TIME_COLUMNS: &[&str] = &[
    "date_value",
    "year",
    "quarter",
    "month",
    "month_name",
    "week_of_year",
    "day_of_month",
    "day_of_week",
    "day_name",
    "is_weekend",
    "is_month_start",
    "is_month_end",
    "is_quarter_start",
    "is_quarter_end",
    "is_year_start",
    "is_year_end",
    "fiscal_year",
    "fiscal_quarter",
];

const SERIES_COLUMNS: &[&str] = &[
    "series_id",
    "slug",
    "title",
    "description",
    "image",
    "icon",
    "series_type",
    "recurrence",
    "active",
    "closed",
    "archived",
    "restricted",
    "featured",
    "layout",
    "start_date",
    "published_at",
    "created_at_source",
    "updated_at_source",
    "created_by",
    "updated_by",
];

const TAG_COLUMNS: &[&str] = &[
    "tag_id",
    "label",
    "slug",
    "parent_tag_id",
    "level",
    "path",
    "force_show",
    "force_hide",
    "is_carousel",
    "requires_translation",
    "published_at",
    "created_at_source",
    "updated_at_source",
    "created_by",
    "updated_by",
];

const EVENT_COLUMNS: &[&str] = &[
    "event_id",
    "ticker",
    "slug",
    "title",
    "description",
    "category",
    "subcategory",
    "image",
    "icon",
    "resolution_source",
    "active",
    "closed",
    "archived",
    "new",
    "featured",
    "restricted",
    "competitive",
    "start_date",
    "creation_date",
    "end_date",
    "closed_time",
    "published_at",
    "created_at_source",
    "updated_at_source",
    "enable_neg_risk",
    "enable_order_book",
    "comments_enabled",
    "series_slug",
    "parent_event_id",
];

const MARKET_COLUMNS: &[&str] = &[
    "market_id",
    "condition_id",
    "slug",
    "question",
    "description",
    "market_type",
    "category",
    "subcategory",
    "outcomes",
    "active",
    "closed",
    "archived",
    "restricted",
    "new",
    "featured",
    "enable_order_book",
    "start_date",
    "end_date",
    "closed_time",
    "created_at_source",
    "updated_at_source",
    "image",
    "icon",
    "resolution_source",
    "neg_risk",
    "neg_risk_market_id",
    "format_type",
    "lower_bound",
    "upper_bound",
    "question_id",
    "market_maker_address",
];

/// Key and price columns of a fact row, in bind order; metrics follow.
const FACT_KEY_COLUMNS: &[&str] = &[
    "market_key",
    "event_key",
    "series_key",
    "snapshot_date_key",
    "start_date_key",
    "end_date_key",
    "closed_date_key",
    "outcome_price_yes",
    "outcome_price_no",
];

/// Rounds to the `NUMERIC(20,10)` scale; non-finite values become NULL.
fn decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(Decimal::from_f64).map(|d| d.round_dp(10))
}

fn rows_per_statement(columns: usize) -> usize {
    (BIND_LIMIT / columns.max(1)).max(1)
}

fn insert_head(table: &str, columns: &[&str]) -> String {
    format!("INSERT INTO {table} ({}) ", columns.join(", "))
}

fn fact_columns() -> Vec<&'static str> {
    FACT_KEY_COLUMNS
        .iter()
        .copied()
        .chain(METRICS.iter().map(|m| m.column))
        .chain(std::iter::once("extraction_timestamp"))
        .collect()
}

/// Runs a multi-row insert in statements sized under the bind limit.
async fn insert_chunked<'a, T, F>(
    conn: &mut PgConnection,
    head: &str,
    tail: &str,
    columns: usize,
    rows: &'a [T],
    mut push: F,
) -> Result<u64>
where
    T: Sync,
    F: FnMut(Separated<'_, 'a, Postgres, &'static str>, &'a T) + Send,
{
    let mut inserted = 0;
    for chunk in rows.chunks(rows_per_statement(columns)) {
        let mut builder: QueryBuilder<'a, Postgres> = QueryBuilder::new(head);
        builder.push_values(chunk, &mut push);
        builder.push(tail);
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

/// Warehouse store backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    /// Connects to the warehouse database.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "Connected to warehouse database");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates every warehouse table that does not exist yet.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        tracing::info!("Warehouse schema initialized");
        Ok(())
    }

    /// Round-trips a trivial query.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn checkpoint(&self, run: &StageRun) -> Result<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, (i32, String, i32, bool)>(
            r"
            SELECT run_key, source_versions, last_batch, completed
            FROM etl_batch_checkpoint
            WHERE stage = $1
            ",
        )
        .bind(run.stage.table())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(run_key, source_versions, last_batch, completed)| Checkpoint {
            run_key,
            source_versions,
            last_batch,
            completed,
        }))
    }

    async fn advance_checkpoint(conn: &mut PgConnection, run: &StageRun, batch: usize) -> Result<()> {
        let batch = i32::try_from(batch).unwrap_or(i32::MAX);
        sqlx::query(
            r"
            UPDATE etl_batch_checkpoint
            SET last_batch = $2, updated_at = NOW()
            WHERE stage = $1
            ",
        )
        .bind(run.stage.table())
        .bind(batch)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WarehouseStore for PgWarehouse {
    async fn insert_time_rows(&self, rows: &[TimeRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            &insert_head("dim_time", TIME_COLUMNS),
            " ON CONFLICT (date_value) DO NOTHING",
            TIME_COLUMNS.len(),
            rows,
            |mut b, r| {
                b.push_bind(r.date_value)
                    .push_bind(r.year)
                    .push_bind(r.quarter)
                    .push_bind(r.month)
                    .push_bind(&r.month_name)
                    .push_bind(r.week_of_year)
                    .push_bind(r.day_of_month)
                    .push_bind(r.day_of_week)
                    .push_bind(&r.day_name)
                    .push_bind(r.is_weekend)
                    .push_bind(r.is_month_start)
                    .push_bind(r.is_month_end)
                    .push_bind(r.is_quarter_start)
                    .push_bind(r.is_quarter_end)
                    .push_bind(r.is_year_start)
                    .push_bind(r.is_year_end)
                    .push_bind(r.fiscal_year)
                    .push_bind(r.fiscal_quarter);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_series(&self, rows: &[SeriesRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            &insert_head("dim_series", SERIES_COLUMNS),
            " ON CONFLICT (series_id) DO NOTHING",
            SERIES_COLUMNS.len(),
            rows,
            |mut b, r| {
                b.push_bind(&r.series_id)
                    .push_bind(&r.slug)
                    .push_bind(&r.title)
                    .push_bind(&r.description)
                    .push_bind(&r.image)
                    .push_bind(&r.icon)
                    .push_bind(&r.series_type)
                    .push_bind(&r.recurrence)
                    .push_bind(r.active)
                    .push_bind(r.closed)
                    .push_bind(r.archived)
                    .push_bind(r.restricted)
                    .push_bind(r.featured)
                    .push_bind(&r.layout)
                    .push_bind(r.start_date)
                    .push_bind(r.published_at)
                    .push_bind(r.created_at_source)
                    .push_bind(r.updated_at_source)
                    .push_bind(&r.created_by)
                    .push_bind(&r.updated_by);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_tags(&self, rows: &[TagRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            &insert_head("dim_tag", TAG_COLUMNS),
            " ON CONFLICT (tag_id) DO NOTHING",
            TAG_COLUMNS.len(),
            rows,
            |mut b, r| {
                b.push_bind(&r.tag_id)
                    .push_bind(&r.label)
                    .push_bind(&r.slug)
                    .push_bind(&r.parent_tag_id)
                    .push_bind(r.level)
                    .push_bind(&r.path)
                    .push_bind(r.force_show)
                    .push_bind(r.force_hide)
                    .push_bind(r.is_carousel)
                    .push_bind(r.requires_translation)
                    .push_bind(r.published_at)
                    .push_bind(r.created_at_source)
                    .push_bind(r.updated_at_source)
                    .push_bind(&r.created_by)
                    .push_bind(&r.updated_by);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_events(&self, rows: &[EventRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            &insert_head("dim_event", EVENT_COLUMNS),
            " ON CONFLICT (event_id) DO NOTHING",
            EVENT_COLUMNS.len(),
            rows,
            |mut b, r| {
                b.push_bind(&r.event_id)
                    .push_bind(&r.ticker)
                    .push_bind(&r.slug)
                    .push_bind(&r.title)
                    .push_bind(&r.description)
                    .push_bind(&r.category)
                    .push_bind(&r.subcategory)
                    .push_bind(&r.image)
                    .push_bind(&r.icon)
                    .push_bind(&r.resolution_source)
                    .push_bind(r.active)
                    .push_bind(r.closed)
                    .push_bind(r.archived)
                    .push_bind(r.new)
                    .push_bind(r.featured)
                    .push_bind(r.restricted)
                    .push_bind(decimal(r.competitive))
                    .push_bind(r.start_date)
                    .push_bind(r.creation_date)
                    .push_bind(r.end_date)
                    .push_bind(r.closed_time)
                    .push_bind(r.published_at)
                    .push_bind(r.created_at_source)
                    .push_bind(r.updated_at_source)
                    .push_bind(r.enable_neg_risk)
                    .push_bind(r.enable_order_book)
                    .push_bind(r.comments_enabled)
                    .push_bind(&r.series_slug)
                    .push_bind(&r.parent_event_id);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_markets(&self, rows: &[MarketRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            &insert_head("dim_market", MARKET_COLUMNS),
            " ON CONFLICT (market_id) DO NOTHING",
            MARKET_COLUMNS.len(),
            rows,
            |mut b, r| {
                b.push_bind(&r.market_id)
                    .push_bind(&r.condition_id)
                    .push_bind(&r.slug)
                    .push_bind(&r.question)
                    .push_bind(&r.description)
                    .push_bind(&r.market_type)
                    .push_bind(&r.category)
                    .push_bind(&r.subcategory)
                    .push_bind(&r.outcomes)
                    .push_bind(r.active)
                    .push_bind(r.closed)
                    .push_bind(r.archived)
                    .push_bind(r.restricted)
                    .push_bind(r.new)
                    .push_bind(r.featured)
                    .push_bind(r.enable_order_book)
                    .push_bind(r.start_date)
                    .push_bind(r.end_date)
                    .push_bind(r.closed_time)
                    .push_bind(r.created_at_source)
                    .push_bind(r.updated_at_source)
                    .push_bind(&r.image)
                    .push_bind(&r.icon)
                    .push_bind(&r.resolution_source)
                    .push_bind(r.neg_risk)
                    .push_bind(&r.neg_risk_market_id)
                    .push_bind(&r.format_type)
                    .push_bind(&r.lower_bound)
                    .push_bind(&r.upper_bound)
                    .push_bind(&r.question_id)
                    .push_bind(&r.market_maker_address);
            },
        )
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn key_map(&self, dimension: Dimension) -> Result<HashMap<String, i32>> {
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE is_current = TRUE",
            dimension.id_column(),
            dimension.key_column(),
            dimension.table()
        );
        let rows = sqlx::query_as::<_, (String, i32)>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn time_keys(&self) -> Result<HashMap<NaiveDate, i32>> {
        let rows = sqlx::query_as::<_, (NaiveDate, i32)>("SELECT date_value, time_key FROM dim_time")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn begin_stage(&self, run: &StageRun) -> Result<usize> {
        if let Some(resume) = self.checkpoint(run).await?.and_then(|c| c.resume_point(run)) {
            tracing::info!(
                stage = %run.stage,
                run_key = run.run_key,
                source_versions = %run.source_versions,
                resume_from = resume,
                "Resuming stage from checkpoint"
            );
            return Ok(resume);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", run.stage.table()))
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"
            INSERT INTO etl_batch_checkpoint (stage, run_key, source_versions, last_batch, completed)
            VALUES ($1, $2, $3, -1, FALSE)
            ON CONFLICT (stage) DO UPDATE
            SET run_key = EXCLUDED.run_key,
                source_versions = EXCLUDED.source_versions,
                last_batch = -1,
                completed = FALSE,
                updated_at = NOW()
            ",
        )
        .bind(run.stage.table())
        .bind(run.run_key)
        .bind(&run.source_versions)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(stage = %run.stage, "Truncated table for fresh stage run");
        Ok(0)
    }

    async fn commit_bridge_batch(&self, run: &StageRun, batch: usize, rows: &[BridgeRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            "INSERT INTO bridge_market_tag (market_key, tag_key) ",
            " ON CONFLICT (market_key, tag_key) DO NOTHING",
            2,
            rows,
            |mut b, r| {
                b.push_bind(r.market_key).push_bind(r.tag_key);
            },
        )
        .await?;
        Self::advance_checkpoint(&mut *tx, run, batch).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn commit_fact_batch(&self, run: &StageRun, batch: usize, rows: &[FactRow]) -> Result<u64> {
        let columns = fact_columns();
        let mut tx = self.pool.begin().await?;
        let inserted = insert_chunked(
            &mut *tx,
            &insert_head("fact_market_metrics", &columns),
            " ON CONFLICT (market_key, snapshot_date_key) DO NOTHING",
            columns.len(),
            rows,
            |mut b, r| {
                b.push_bind(r.market_key)
                    .push_bind(r.event_key)
                    .push_bind(r.series_key)
                    .push_bind(r.snapshot_date_key)
                    .push_bind(r.start_date_key)
                    .push_bind(r.end_date_key)
                    .push_bind(r.closed_date_key)
                    .push_bind(decimal(r.outcome_price_yes))
                    .push_bind(decimal(r.outcome_price_no));
                for value in r.metrics {
                    b.push_bind(decimal(value));
                }
                b.push_bind(r.extraction_timestamp);
            },
        )
        .await?;
        Self::advance_checkpoint(&mut *tx, run, batch).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn finish_stage(&self, run: &StageRun) -> Result<()> {
        sqlx::query(
            r"
            UPDATE etl_batch_checkpoint
            SET completed = TRUE, updated_at = NOW()
            WHERE stage = $1
            ",
        )
        .bind(run.stage.table())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_stay_under_bind_limit() {
        let columns = fact_columns();
        assert_eq!(columns.len(), 42);
        assert_eq!(columns[9], "liquidity");
        assert_eq!(columns.last(), Some(&"extraction_timestamp"));
        assert!(rows_per_statement(columns.len()) * columns.len() <= BIND_LIMIT);
        assert_eq!(rows_per_statement(2), 32_767);
    }

    #[test]
    fn test_decimal_rounding() {
        assert_eq!(decimal(Some(0.5)), Decimal::from_f64(0.5));
        assert_eq!(decimal(Some(f64::NAN)), None);
        assert_eq!(decimal(None), None);
        let rounded = decimal(Some(0.123_456_789_012_345)).unwrap();
        assert!(rounded.scale() <= 10);
    }

    #[test]
    fn test_schema_declares_every_table() {
        for table in [
            "dim_time",
            "dim_series",
            "dim_tag",
            "dim_event",
            "dim_market",
            "bridge_market_tag",
            "fact_market_metrics",
            "etl_batch_checkpoint",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing {table}"
            );
        }
    }
}
