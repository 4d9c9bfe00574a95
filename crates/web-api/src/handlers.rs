use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use market_warehouse_data::models::{
    CategoryStats, EventDetail, EventSummary, MarketDetail, MarketSummary, MarketVolume,
    SeriesDetail, SeriesSummary, TagMarkets, TagSummary, WarehouseSummary,
};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::params::{ActiveFilter, CategoryFilter, Pagination, SearchQuery};
use crate::server::AppState;

/// Routes listed by the index endpoint.
pub const ENDPOINTS: [&str; 14] = [
    "/health",
    "/markets",
    "/markets/top-volume",
    "/markets/search",
    "/markets/:market_id",
    "/events",
    "/events/:event_id",
    "/series",
    "/series/:series_id",
    "/tags",
    "/tags/:tag_id/markets",
    "/analytics/category-stats",
    "/analytics/summary",
    "/",
];

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: &'static [&'static str],
}

fn not_found(kind: &str, id: &str) -> ApiError {
    ApiError::NotFound(format!("{kind} '{id}' not found"))
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        name: "market-warehouse",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: &ENDPOINTS,
    })
}

/// GET /markets
///
/// # Errors
/// Returns 400 for invalid pagination, 500 if the query fails.
pub async fn list_markets(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<MarketSummary>>> {
    let page = pagination.page()?;
    Ok(Json(state.repos.markets.list(page.limit, page.offset).await?))
}

/// GET /markets/top-volume?category=
///
/// # Errors
/// Returns 400 for invalid pagination, 500 if the query fails.
pub async fn top_volume(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CategoryFilter>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<MarketVolume>>> {
    let page = pagination.page()?;
    let category = filter.category.as_deref().filter(|c| !c.is_empty());
    let markets = state
        .repos
        .markets
        .top_volume(category, page.limit, page.offset)
        .await?;
    Ok(Json(markets))
}

/// GET /markets/search?q=
///
/// # Errors
/// Returns 400 for a short term or invalid pagination, 500 if the query fails.
pub async fn search_markets(
    State(state): State<Arc<AppState>>,
    Query(search): Query<SearchQuery>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<MarketSummary>>> {
    let term = search.term()?;
    let page = pagination.page()?;
    let markets = state
        .repos
        .markets
        .search(term, page.limit, page.offset)
        .await?;
    Ok(Json(markets))
}

/// GET /markets/:market_id
///
/// # Errors
/// Returns 404 for an unknown market, 500 if the query fails.
pub async fn get_market(
    State(state): State<Arc<AppState>>,
    Path(market_id): Path<String>,
) -> ApiResult<Json<MarketDetail>> {
    state
        .repos
        .markets
        .get(&market_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("market", &market_id))
}

/// GET /events?active_only=
///
/// # Errors
/// Returns 400 for invalid pagination, 500 if the query fails.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ActiveFilter>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<EventSummary>>> {
    let page = pagination.page()?;
    let events = state
        .repos
        .events
        .list(filter.active_only, page.limit, page.offset)
        .await?;
    Ok(Json(events))
}

/// GET /events/:event_id
///
/// # Errors
/// Returns 404 for an unknown event, 500 if the query fails.
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<EventDetail>> {
    state
        .repos
        .events
        .get(&event_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("event", &event_id))
}

/// GET /series
///
/// # Errors
/// Returns 400 for invalid pagination, 500 if the query fails.
pub async fn list_series(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<SeriesSummary>>> {
    let page = pagination.page()?;
    Ok(Json(state.repos.series.list(page.limit, page.offset).await?))
}

/// GET /series/:series_id
///
/// # Errors
/// Returns 404 for an unknown series, 500 if the query fails.
pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Path(series_id): Path<String>,
) -> ApiResult<Json<SeriesDetail>> {
    state
        .repos
        .series
        .get(&series_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("series", &series_id))
}

/// GET /tags
///
/// # Errors
/// Returns 400 for invalid pagination, 500 if the query fails.
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<TagSummary>>> {
    let page = pagination.page()?;
    Ok(Json(state.repos.tags.list(page.limit, page.offset).await?))
}

/// GET /tags/:tag_id/markets
///
/// # Errors
/// Returns 404 for an unknown tag, 400 for invalid pagination, 500 if the
/// query fails.
pub async fn tag_markets(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<String>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<TagMarkets>> {
    let page = pagination.page()?;
    state
        .repos
        .tags
        .markets(&tag_id, page.limit, page.offset)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("tag", &tag_id))
}

/// GET /analytics/category-stats
///
/// # Errors
/// Returns 400 for invalid pagination, 500 if the query fails.
pub async fn category_stats(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Vec<CategoryStats>>> {
    let page = pagination.page()?;
    let stats = state
        .repos
        .analytics
        .category_stats(page.limit, page.offset)
        .await?;
    Ok(Json(stats))
}

/// GET /analytics/summary
///
/// # Errors
/// Returns 500 if the query fails.
pub async fn summary(State(state): State<Arc<AppState>>) -> ApiResult<Json<WarehouseSummary>> {
    Ok(Json(state.repos.analytics.summary().await?))
}
