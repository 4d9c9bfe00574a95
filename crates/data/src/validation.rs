//! Post-load warehouse checks.

use std::fmt;

use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::Dimension;

/// Tables counted by [`WarehouseValidator::validate`].
pub const WAREHOUSE_TABLES: [&str; 7] = [
    "dim_time",
    "dim_series",
    "dim_tag",
    "dim_event",
    "dim_market",
    "bridge_market_tag",
    "fact_market_metrics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    /// Pass when `offending` is zero, otherwise `severity`.
    fn counted(name: impl Into<String>, offending: i64, severity: CheckStatus, what: &str) -> Self {
        let (status, detail) = if offending == 0 {
            (CheckStatus::Pass, format!("no {what}"))
        } else {
            (severity, format!("{offending} {what}"))
        };
        Self {
            name: name.into(),
            status,
            detail,
        }
    }

    /// Row count of a table; an empty table is a warning.
    #[must_use]
    pub fn row_count(table: &str, rows: i64) -> Self {
        Self {
            name: format!("{table} rows"),
            status: if rows > 0 {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
            detail: if rows > 0 {
                format!("{rows} rows")
            } else {
                "table is empty".to_string()
            },
        }
    }

    #[must_use]
    pub fn orphans(relation: &str, orphans: i64) -> Self {
        Self::counted(relation, orphans, CheckStatus::Fail, "orphaned rows")
    }

    #[must_use]
    pub fn duplicates(table: &str, duplicates: i64) -> Self {
        Self::counted(
            format!("{table} natural keys"),
            duplicates,
            CheckStatus::Fail,
            "duplicated current keys",
        )
    }

    #[must_use]
    pub fn nulls(column: &str, nulls: i64) -> Self {
        Self::counted(column, nulls, CheckStatus::Warn, "null values")
    }

    #[must_use]
    pub fn prices_out_of_range(rows: i64) -> Self {
        Self::counted("outcome prices in [0, 1]", rows, CheckStatus::Warn, "rows out of range")
    }

    #[must_use]
    pub fn negative_volume(rows: i64) -> Self {
        Self::counted("volume non-negative", rows, CheckStatus::Fail, "rows with negative volume")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    /// True when no check failed; warnings are allowed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.count(CheckStatus::Fail) == 0
    }

    #[must_use]
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    fn push(&mut self, check: Check) {
        match check.status {
            CheckStatus::Pass => tracing::debug!(check = %check.name, detail = %check.detail, "Check passed"),
            CheckStatus::Warn => tracing::warn!(check = %check.name, detail = %check.detail, "Check warning"),
            CheckStatus::Fail => tracing::error!(check = %check.name, detail = %check.detail, "Check failed"),
        }
        self.checks.push(check);
    }
}

/// Runs integrity and quality checks against a loaded warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseValidator {
    pool: PgPool,
}

impl WarehouseValidator {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn scalar(&self, sql: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await?)
    }

    /// Runs every check.
    ///
    /// # Errors
    /// Returns an error if a query fails; failed checks are reported, not raised.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for table in WAREHOUSE_TABLES {
            let rows = self.scalar(&format!("SELECT COUNT(*) FROM {table}")).await?;
            report.push(Check::row_count(table, rows));
        }

        let orphan_queries = [
            (
                "fact_market_metrics -> dim_market",
                "SELECT COUNT(*) FROM fact_market_metrics f \
                 LEFT JOIN dim_market m ON f.market_key = m.market_key \
                 WHERE m.market_key IS NULL",
            ),
            (
                "fact_market_metrics -> dim_time",
                "SELECT COUNT(*) FROM fact_market_metrics f \
                 LEFT JOIN dim_time t ON f.snapshot_date_key = t.time_key \
                 WHERE t.time_key IS NULL",
            ),
            (
                "bridge_market_tag -> dim_market",
                "SELECT COUNT(*) FROM bridge_market_tag b \
                 LEFT JOIN dim_market m ON b.market_key = m.market_key \
                 WHERE m.market_key IS NULL",
            ),
            (
                "bridge_market_tag -> dim_tag",
                "SELECT COUNT(*) FROM bridge_market_tag b \
                 LEFT JOIN dim_tag t ON b.tag_key = t.tag_key \
                 WHERE t.tag_key IS NULL",
            ),
        ];
        for (relation, sql) in orphan_queries {
            report.push(Check::orphans(relation, self.scalar(sql).await?));
        }

        for dimension in [Dimension::Series, Dimension::Tag, Dimension::Event, Dimension::Market] {
            let sql = format!(
                "SELECT COUNT(*) FROM (SELECT {id} FROM {table} WHERE is_current = TRUE \
                 GROUP BY {id} HAVING COUNT(*) > 1) d",
                id = dimension.id_column(),
                table = dimension.table()
            );
            report.push(Check::duplicates(dimension.table(), self.scalar(&sql).await?));
        }

        for (column, sql) in [
            ("dim_market.question", "SELECT COUNT(*) FROM dim_market WHERE question IS NULL"),
            ("dim_event.title", "SELECT COUNT(*) FROM dim_event WHERE title IS NULL"),
        ] {
            report.push(Check::nulls(column, self.scalar(sql).await?));
        }

        let out_of_range = self
            .scalar(
                "SELECT COUNT(*) FROM fact_market_metrics \
                 WHERE (outcome_price_yes IS NOT NULL AND (outcome_price_yes < 0 OR outcome_price_yes > 1)) \
                    OR (outcome_price_no IS NOT NULL AND (outcome_price_no < 0 OR outcome_price_no > 1))",
            )
            .await?;
        report.push(Check::prices_out_of_range(out_of_range));

        let negative = self
            .scalar("SELECT COUNT(*) FROM fact_market_metrics WHERE volume IS NOT NULL AND volume < 0")
            .await?;
        report.push(Check::negative_volume(negative));

        tracing::info!(
            passed = report.count(CheckStatus::Pass),
            warnings = report.count(CheckStatus::Warn),
            failed = report.count(CheckStatus::Fail),
            "Warehouse validation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_is_a_warning() {
        assert_eq!(Check::row_count("dim_tag", 0).status, CheckStatus::Warn);
        assert_eq!(Check::row_count("dim_tag", 12).status, CheckStatus::Pass);
    }

    #[test]
    fn test_report_fails_only_on_failures() {
        let mut report = ValidationReport::default();
        report.push(Check::row_count("dim_tag", 0));
        report.push(Check::prices_out_of_range(3));
        report.push(Check::orphans("bridge_market_tag -> dim_tag", 0));
        assert!(report.is_ok());
        assert_eq!(report.count(CheckStatus::Warn), 2);

        report.push(Check::duplicates("dim_market", 2));
        assert!(!report.is_ok());
        assert_eq!(report.checks[3].detail, "2 duplicated current keys");
    }
}
