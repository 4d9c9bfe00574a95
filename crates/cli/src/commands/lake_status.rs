//! `lake-status`: versions and sizes of the landed tables.

use anyhow::{Context, Result};
use clap::Args;
use market_warehouse_core::PipelineConfig;
use market_warehouse_lake::{Lake, TableInfo};

#[derive(Args, Debug, Clone, Default)]
pub struct LakeStatusArgs {
    /// Also print schema, history and null counts of this table
    #[arg(long)]
    pub table: Option<String>,
}

/// One line of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLine {
    pub name: String,
    pub version: u64,
    pub files: usize,
    pub size: u64,
    pub records: usize,
    pub columns: usize,
}

impl From<&TableInfo> for TableLine {
    fn from(info: &TableInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version,
            files: info.files.len(),
            size: info.files.iter().map(|f| f.size).sum(),
            records: info.files.iter().filter_map(|f| f.records).sum(),
            columns: info.schema.len(),
        }
    }
}

/// Status of every table under the lake directory.
///
/// # Errors
/// Returns an error if the lake directory or a table log cannot be read.
pub async fn lake_status(lake: &Lake) -> Result<Vec<TableLine>> {
    let mut lines = Vec::new();
    for name in lake.list_tables()? {
        let info = lake
            .table_info(&name)
            .await
            .with_context(|| format!("Failed to read table {name}"))?;
        lines.push(TableLine::from(&info));
    }
    Ok(lines)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// Runs the lake-status command.
///
/// # Errors
/// Returns an error if the lake cannot be read.
pub async fn run_lake_status(config: &PipelineConfig, args: &LakeStatusArgs) -> Result<()> {
    let lake = Lake::new(&config.lake.base_dir);
    let lines = lake_status(&lake).await?;

    println!();
    println!("{}", "=".repeat(72));
    println!("LAKE STATUS ({})", lake.base_dir().display());
    println!("{}", "=".repeat(72));
    if lines.is_empty() {
        println!("No tables found.");
    } else {
        println!(
            "{:<12} {:>8} {:>6} {:>12} {:>12} {:>8}",
            "Table", "Version", "Files", "Size", "Records", "Columns"
        );
        println!("{}", "-".repeat(72));
        for line in &lines {
            println!(
                "{:<12} {:>8} {:>6} {:>12} {:>12} {:>8}",
                line.name,
                line.version,
                line.files,
                format_size(line.size),
                line.records,
                line.columns
            );
        }
    }
    println!("{}", "=".repeat(72));

    if let Some(table) = &args.table {
        print_table_detail(&lake, table).await?;
    }
    Ok(())
}

async fn print_table_detail(lake: &Lake, table: &str) -> Result<()> {
    let info = lake.table_info(table).await?;
    let stats = lake.table_stats(table).await?;

    println!();
    println!("SCHEMA OF {table}:");
    println!("{}", info.schema_string());

    println!();
    println!("HISTORY:");
    for commit in &info.history {
        println!(
            "  v{:<5} {:<25} {:<10} {:<10} {}",
            commit.version,
            commit
                .timestamp
                .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            commit.operation.as_deref().unwrap_or("-"),
            commit.mode.as_deref().unwrap_or("-"),
            commit.records.map_or_else(|| "-".to_string(), |r| r.to_string())
        );
    }

    println!();
    println!("NULL COUNTS ({} records):", stats.records);
    for column in stats.columns.iter().filter(|c| c.null_count > 0) {
        println!("  {:<30} {:>10}", column.name, column.null_count);
    }
    Ok(())
}
