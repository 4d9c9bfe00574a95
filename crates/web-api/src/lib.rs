//! Read-only HTTP API over the market warehouse.

pub mod error;
pub mod handlers;
pub mod health;
pub mod params;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use health::{HealthResponse, ServiceStatus};
pub use server::{ApiServer, AppState};
