//! Read-only repositories over the warehouse.
//!
//! Each repository owns a pool handle and returns typed views. Market
//! metrics always come from the market's latest snapshot.

pub mod analytics_repo;
pub mod event_repo;
pub mod market_repo;
pub mod series_repo;
pub mod tag_repo;

pub use analytics_repo::AnalyticsRepository;
pub use event_repo::EventRepository;
pub use market_repo::MarketRepository;
pub use series_repo::SeriesRepository;
pub use tag_repo::TagRepository;

use sqlx::PgPool;

/// Joins the latest fact row of market `m` as `f`.
pub(crate) const LATEST_FACT_JOIN: &str = "
    LEFT JOIN LATERAL (
        SELECT *
        FROM fact_market_metrics lf
        WHERE lf.market_key = m.market_key
        ORDER BY lf.snapshot_date_key DESC
        LIMIT 1
    ) f ON TRUE";

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Every read repository over one pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub markets: MarketRepository,
    pub events: EventRepository,
    pub series: SeriesRepository,
    pub tags: TagRepository,
    pub analytics: AnalyticsRepository,
}

impl Repositories {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            markets: MarketRepository::new(pool.clone()),
            events: EventRepository::new(pool.clone()),
            series: SeriesRepository::new(pool.clone()),
            tags: TagRepository::new(pool.clone()),
            analytics: AnalyticsRepository::new(pool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bitcoin"), "%bitcoin%");
        assert_eq!(like_pattern("50%_up"), "%50\\%\\_up%");
    }
}
