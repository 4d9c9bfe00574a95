//! Core types shared by every stage of the market warehouse pipeline.
//!
//! This crate provides:
//! - [`PipelineConfig`] and its figment-based [`ConfigLoader`]
//! - [`RawRecord`]/[`RawValue`], the schema-less extraction record
//! - [`EntityKind`], the four extracted API collections

pub mod config;
pub mod config_loader;
pub mod entity;
pub mod record;

pub use config::{
    ApiConfig, ConfigError, ExtractionConfig, LakeConfig, PipelineConfig, RetryConfig,
    ServerConfig, WarehouseConfig, WriteMode, GAMMA_API_URL,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use entity::EntityKind;
pub use record::{RawRecord, RawValue};
