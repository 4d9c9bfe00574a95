//! Relational side of the market warehouse.
//!
//! This crate provides:
//! - Cleaning helpers and the relaxed parser for text-encoded nested fields
//! - Explicit mapping from raw records to dimension rows
//! - The batched, resumable star-schema [`Loader`] over a [`WarehouseStore`]
//! - [`PgWarehouse`] (Postgres) and [`MemoryWarehouse`] stores
//! - Read repositories and post-load validation

pub mod bridge;
pub mod clean;
pub mod database;
pub mod error;
pub mod facts;
pub mod loader;
pub mod mapping;
pub mod memory;
pub mod models;
pub mod relaxed_json;
pub mod repositories;
pub mod store;
pub mod time_dim;
pub mod validation;

pub use bridge::{derive_links, EventLinks};
pub use clean::{clean_numeric, clean_value, outcome_prices};
pub use database::{PgWarehouse, SCHEMA_SQL};
pub use error::{LoadError, Result};
pub use facts::{FactContext, FactCounters};
pub use loader::{
    BatchLoad, DimensionLoad, LoadReport, LoadSources, Loader, SourceTable, StageReport,
    StageStatus, DEFAULT_BATCH_SIZE,
};
pub use mapping::{dedup_by_key, map_event, map_market, map_series, map_tag, NATURAL_KEY_FIELD};
pub use memory::MemoryWarehouse;
pub use models::{BridgeRow, Dimension, FactRow, TimeRow};
pub use relaxed_json::{parse_relaxed_json, RelaxedJsonError};
pub use repositories::{
    AnalyticsRepository, EventRepository, MarketRepository, Repositories, SeriesRepository,
    TagRepository,
};
pub use store::{BatchStage, Checkpoint, StageRun, WarehouseStore};
pub use validation::{Check, CheckStatus, ValidationReport, WarehouseValidator};
