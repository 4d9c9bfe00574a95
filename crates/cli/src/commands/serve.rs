//! `serve`: the read-only HTTP API.

use anyhow::{Context, Result};
use clap::Args;
use market_warehouse_core::PipelineConfig;
use market_warehouse_web_api::ApiServer;
use sqlx::postgres::PgPoolOptions;

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Listen address, overriding server.host and server.port
    #[arg(long)]
    pub addr: Option<String>,

    /// Pool size for request handlers
    #[arg(long, default_value_t = 5)]
    pub pool_size: u32,
}

/// Serves the API until the process is stopped.
///
/// # Errors
/// Returns an error if the database URL is missing or the address cannot be bound.
pub async fn run_serve(config: &PipelineConfig, args: &ServeArgs) -> Result<()> {
    config.validate_for_database()?;
    // Lazy: /health reports degraded while the database is down.
    let pool = PgPoolOptions::new()
        .max_connections(args.pool_size.max(1))
        .connect_lazy(&config.warehouse.database_url)
        .context("Invalid warehouse database URL")?;

    let addr = args
        .addr
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    ApiServer::new(pool).serve(&addr).await
}
