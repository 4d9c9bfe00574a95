//! Warehouse maintenance: `init-schema` and `validate`.

use anyhow::{Context, Result};
use market_warehouse_core::PipelineConfig;
use market_warehouse_data::{CheckStatus, PgWarehouse, ValidationReport, WarehouseValidator};

async fn connect(config: &PipelineConfig) -> Result<PgWarehouse> {
    config.validate_for_database()?;
    PgWarehouse::connect(
        &config.warehouse.database_url,
        config.warehouse.max_connections,
    )
    .await
    .context("Failed to connect to the warehouse database")
}

/// Creates the warehouse tables if they do not exist.
///
/// # Errors
/// Returns an error if the database is unreachable or the DDL fails.
pub async fn run_init_schema(config: &PipelineConfig) -> Result<()> {
    let warehouse = connect(config).await?;
    warehouse
        .init_schema()
        .await
        .context("Failed to create warehouse schema")?;
    println!("Warehouse schema ready.");
    Ok(())
}

/// Runs the post-load checks and prints them.
///
/// # Errors
/// Returns an error if the database is unreachable or a check query fails.
pub async fn run_validate(config: &PipelineConfig) -> Result<ValidationReport> {
    let warehouse = connect(config).await?;
    let report = WarehouseValidator::new(warehouse.pool().clone())
        .validate()
        .await
        .context("Warehouse validation failed to run")?;
    print_validation(&report);
    Ok(report)
}

fn print_validation(report: &ValidationReport) {
    println!();
    println!("{}", "=".repeat(80));
    println!("WAREHOUSE VALIDATION");
    println!("{}", "=".repeat(80));
    println!("{:<6} {:<40} {}", "Status", "Check", "Detail");
    println!("{}", "-".repeat(80));
    for check in &report.checks {
        println!("{:<6} {:<40} {}", check.status.to_string(), check.name, check.detail);
    }
    println!("{}", "-".repeat(80));
    println!(
        "{} passed, {} warnings, {} failed",
        report.count(CheckStatus::Pass),
        report.count(CheckStatus::Warn),
        report.count(CheckStatus::Fail)
    );
    println!("{}", "=".repeat(80));
}
