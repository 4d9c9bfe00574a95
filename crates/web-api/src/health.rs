//! `/health`: database reachability and snapshot freshness.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::server::AppState;

/// Days after which the latest snapshot counts as stale.
const STALE_AFTER_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Fresh,
    Stale,
    Missing,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub database: DatabaseStatus,
    pub snapshot: SnapshotStatus,
    pub latest_snapshot: Option<NaiveDate>,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

/// Freshness of the newest loaded snapshot relative to `today`.
fn snapshot_status(latest: Option<NaiveDate>, today: NaiveDate) -> SnapshotStatus {
    match latest {
        None => SnapshotStatus::Missing,
        Some(date) if (today - date).num_days() <= STALE_AFTER_DAYS => SnapshotStatus::Fresh,
        Some(_) => SnapshotStatus::Stale,
    }
}

/// Only an unreachable database degrades the service; stale data is reported
/// but still served.
fn overall_status(database: DatabaseStatus) -> ServiceStatus {
    match database {
        DatabaseStatus::Healthy => ServiceStatus::Healthy,
        DatabaseStatus::Unhealthy => ServiceStatus::Degraded,
    }
}

async fn latest_snapshot(pool: &PgPool) -> Result<Option<NaiveDate>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<NaiveDate>>(
        "SELECT MAX(t.date_value) FROM fact_market_metrics f \
         JOIN dim_time t ON t.time_key = f.snapshot_date_key",
    )
    .fetch_one(pool)
    .await
}

/// GET /health
///
/// Always answers 200; the body carries the degraded state.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (database, latest, snapshot) = match latest_snapshot(&state.pool).await {
        Ok(latest) => (
            DatabaseStatus::Healthy,
            latest,
            snapshot_status(latest, Utc::now().date_naive()),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the warehouse");
            (DatabaseStatus::Unhealthy, None, SnapshotStatus::Unknown)
        }
    };

    Json(HealthResponse {
        status: overall_status(database),
        database,
        snapshot,
        latest_snapshot: latest,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_snapshot_status() {
        assert_eq!(snapshot_status(Some(date(10)), date(10)), SnapshotStatus::Fresh);
        assert_eq!(snapshot_status(Some(date(8)), date(10)), SnapshotStatus::Fresh);
        assert_eq!(snapshot_status(Some(date(7)), date(10)), SnapshotStatus::Stale);
        assert_eq!(snapshot_status(None, date(10)), SnapshotStatus::Missing);
    }

    #[test]
    fn test_unreachable_database_degrades() {
        assert_eq!(overall_status(DatabaseStatus::Healthy), ServiceStatus::Healthy);
        assert_eq!(overall_status(DatabaseStatus::Unhealthy), ServiceStatus::Degraded);
    }
}
