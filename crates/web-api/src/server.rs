use std::sync::Arc;

use axum::{routing::get, Router};
use market_warehouse_data::Repositories;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{handlers, health};

/// Shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repos: Repositories,
}

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let repos = Repositories::new(pool.clone());
        Self {
            state: Arc::new(AppState { pool, repos }),
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(handlers::index))
            .route("/health", get(health::health))
            .route("/markets", get(handlers::list_markets))
            .route("/markets/top-volume", get(handlers::top_volume))
            .route("/markets/search", get(handlers::search_markets))
            .route("/markets/:market_id", get(handlers::get_market))
            .route("/events", get(handlers::list_events))
            .route("/events/:event_id", get(handlers::get_event))
            .route("/series", get(handlers::list_series))
            .route("/series/:series_id", get(handlers::get_series))
            .route("/tags", get(handlers::list_tags))
            .route("/tags/:tag_id/markets", get(handlers::tag_markets))
            .route("/analytics/category-stats", get(handlers::category_stats))
            .route("/analytics/summary", get(handlers::summary))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Warehouse API listening");

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
