use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use deltalake::delta_datafusion::DataFusionMixins;
use deltalake::kernel::Add;
use deltalake::operations::transaction::CommitProperties;
use deltalake::operations::write::SchemaMode;
use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use deltalake::protocol::SaveMode;
use deltalake::{DeltaOps, DeltaTable};
use market_warehouse_core::{RawRecord, RawValue, WriteMode};
use serde::Serialize;
use serde_json::json;

use crate::convert::{batch_to_records, records_to_batch};
use crate::error::{LakeError, Result};
use crate::schema::{self, ColumnSpec, ColumnType, TableSchema, EXTRACTION_TIMESTAMP};

/// Number of commits reported by [`Lake::table_info`].
pub const HISTORY_LIMIT: usize = 5;

/// Name of the Delta commit log directory inside a table directory.
pub const LOG_DIR: &str = "_delta_log";

/// Commit info keys recorded with every write.
const WRITE_MODE_KEY: &str = "writeMode";
const NUM_RECORDS_KEY: &str = "numRecords";

/// A directory of Delta tables.
#[derive(Debug, Clone)]
pub struct Lake {
    base_dir: PathBuf,
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub version: u64,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    /// Row count from the file statistics, when the writer recorded them.
    pub records: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitSummary {
    pub version: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub operation: Option<String>,
    pub mode: Option<String>,
    pub records: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub path: PathBuf,
    pub version: u64,
    pub files: Vec<FileInfo>,
    pub schema: Vec<ColumnSpec>,
    pub history: Vec<CommitSummary>,
}

impl TableInfo {
    /// Schema as `name: type` lines.
    #[must_use]
    pub fn schema_string(&self) -> String {
        schema::render(&self.schema)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    pub name: String,
    pub column_type: ColumnType,
    pub null_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub name: String,
    pub version: u64,
    pub records: usize,
    pub columns: Vec<ColumnStats>,
}

impl Lake {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding `table`.
    ///
    /// # Errors
    ///
    /// Rejects names that are empty or would escape the base directory.
    pub fn table_dir(&self, table: &str) -> Result<PathBuf> {
        let valid = !table.is_empty()
            && !table.starts_with('.')
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        if valid {
            Ok(self.base_dir.join(table))
        } else {
            Err(LakeError::InvalidTableName(table.to_string()))
        }
    }

    /// Opens `table` at `version` (latest when `None`).
    async fn open(&self, table: &str, version: Option<u64>) -> Result<(PathBuf, DeltaTable)> {
        let table_dir = self.table_dir(table)?;
        if !table_dir.join(LOG_DIR).is_dir() {
            return Err(LakeError::TableNotFound(table.to_string()));
        }

        let mut delta = deltalake::open_table(table_dir.to_string_lossy()).await?;
        if let Some(version) = version {
            if version > table_version(&delta)? {
                return Err(LakeError::VersionNotFound {
                    table: table.to_string(),
                    version,
                });
            }
            let target = i64::try_from(version).map_err(|_| LakeError::VersionNotFound {
                table: table.to_string(),
                version,
            })?;
            delta.load_version(target).await?;
        }
        Ok((table_dir, delta))
    }

    /// Writes `records` as a new version, logging failures.
    ///
    /// Returns `true` once the version is published.
    pub async fn write(&self, table: &str, records: &[RawRecord], mode: WriteMode) -> bool {
        match self.try_write(table, records, mode).await {
            Ok(outcome) => {
                tracing::info!(
                    table,
                    version = outcome.version,
                    records = outcome.records,
                    %mode,
                    "Wrote table version"
                );
                true
            }
            Err(e) => {
                tracing::error!(table, %mode, error = %e, "Table write failed");
                false
            }
        }
    }

    /// Writes `records` as a new version.
    ///
    /// # Errors
    ///
    /// Fails on empty input, schema conflicts in append mode, I/O errors and
    /// Delta commit failures. A failed write publishes nothing.
    pub async fn try_write(
        &self,
        table: &str,
        records: &[RawRecord],
        mode: WriteMode,
    ) -> Result<WriteOutcome> {
        self.write_at(table, records, mode, Utc::now()).await
    }

    async fn write_at(
        &self,
        table: &str,
        records: &[RawRecord],
        mode: WriteMode,
        extracted_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        if records.is_empty() {
            return Err(LakeError::EmptyWrite(table.to_string()));
        }
        let table_dir = self.table_dir(table)?;

        let current = match self.open(table, None).await {
            Ok((_, delta)) => Some(delta),
            Err(LakeError::TableNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let incoming = schema::infer(records);
        let schema = match &current {
            None => incoming,
            Some(delta) => {
                let existing = table_schema(delta)?;
                schema::merge(&existing, &incoming, mode == WriteMode::Append)?
            }
        };
        let batch = records_to_batch(records, &schema, extracted_at)?;

        let exists = current.is_some();
        let ops = match current {
            Some(delta) => DeltaOps::from(delta),
            None => {
                fs::create_dir_all(&table_dir)?;
                DeltaOps::try_from_uri(table_dir.to_string_lossy()).await?
            }
        };

        let commit = CommitProperties::default().with_metadata([
            (WRITE_MODE_KEY.to_string(), json!(mode.to_string())),
            (NUM_RECORDS_KEY.to_string(), json!(records.len())),
        ]);
        let mut write = ops
            .write(vec![batch])
            .with_table_name(table)
            .with_commit_properties(commit);
        write = match mode {
            WriteMode::Overwrite => write.with_save_mode(SaveMode::Overwrite),
            WriteMode::Append => write.with_save_mode(SaveMode::Append),
        };
        if exists {
            // the merged schema already carries every existing column
            write = write.with_schema_mode(match mode {
                WriteMode::Overwrite => SchemaMode::Overwrite,
                WriteMode::Append => SchemaMode::Merge,
            });
        }
        let written = write.await?;

        Ok(WriteOutcome {
            version: table_version(&written)?,
            records: records.len(),
        })
    }

    /// Reads every record of `table` as of `version` (latest when `None`).
    ///
    /// Records come back in write order, with columns added by later
    /// versions present as nulls.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or version does not exist or a data
    /// file cannot be decoded.
    pub async fn read(&self, table: &str, version: Option<u64>) -> Result<Vec<RawRecord>> {
        let (table_dir, delta) = self.open(table, version).await?;
        let schema = table_schema(&delta)?;

        let mut parts = Vec::new();
        for add in delta.snapshot()?.file_actions()? {
            parts.push(read_data_file(&table_dir.join(&add.path), &schema)?);
        }
        // one write stamps one extraction instant on all of its rows
        parts.sort_by_cached_key(|rows| {
            rows.first()
                .and_then(|r| r.get(EXTRACTION_TIMESTAMP))
                .and_then(RawValue::as_str)
                .map(str::to_string)
        });

        let mut records: Vec<RawRecord> = parts.into_iter().flatten().collect();
        for record in &mut records {
            fill_missing_columns(record, &schema);
        }

        tracing::debug!(
            table,
            version = table_version(&delta)?,
            records = records.len(),
            "Read table"
        );
        Ok(records)
    }

    /// Names of every table under the base directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory exists but cannot be listed.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        if !self.base_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut tables = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.path().join(LOG_DIR).is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    tables.push(name.to_string());
                }
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Current version, live files, schema and recent history of `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or its log is unreadable.
    pub async fn table_info(&self, table: &str) -> Result<TableInfo> {
        let (table_dir, delta) = self.open(table, None).await?;
        let version = table_version(&delta)?;
        let schema = table_schema(&delta)?;
        let files = delta
            .snapshot()?
            .file_actions()?
            .iter()
            .map(file_info)
            .collect();

        let history = match delta.history(Some(HISTORY_LIMIT)).await {
            // newest first
            Ok(commits) => commits
                .into_iter()
                .zip((0..=version).rev())
                .map(|(commit, version)| CommitSummary {
                    version,
                    timestamp: commit
                        .timestamp
                        .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
                    operation: commit.operation.clone(),
                    mode: commit
                        .info
                        .get(WRITE_MODE_KEY)
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    records: commit
                        .info
                        .get(NUM_RECORDS_KEY)
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|n| usize::try_from(n).ok()),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(table, error = %e, "Could not read table history");
                Vec::new()
            }
        };

        Ok(TableInfo {
            name: table.to_string(),
            path: table_dir,
            version,
            files,
            schema,
            history,
        })
    }

    /// Record count and per-column null counts of the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub async fn table_stats(&self, table: &str) -> Result<TableStats> {
        let (_, delta) = self.open(table, None).await?;
        let version = table_version(&delta)?;
        let schema = table_schema(&delta)?;
        let records = self.read(table, Some(version)).await?;

        let columns = schema
            .iter()
            .map(|column| ColumnStats {
                name: column.name.clone(),
                column_type: column.column_type,
                null_count: records
                    .iter()
                    .filter(|r| r.get(&column.name).is_none())
                    .count(),
            })
            .collect();

        Ok(TableStats {
            name: table.to_string(),
            version,
            records: records.len(),
            columns,
        })
    }
}

fn table_version(delta: &DeltaTable) -> Result<u64> {
    u64::try_from(delta.version())
        .map_err(|_| LakeError::Corrupt(format!("table has no committed version: {}", delta.version())))
}

fn table_schema(delta: &DeltaTable) -> Result<TableSchema> {
    let arrow_schema = delta.snapshot()?.arrow_schema()?;
    schema::from_arrow_schema(&arrow_schema)
}

fn file_info(add: &Add) -> FileInfo {
    let records = add
        .stats
        .as_deref()
        .and_then(|stats| serde_json::from_str::<serde_json::Value>(stats).ok())
        .and_then(|stats| stats.get(NUM_RECORDS_KEY).and_then(serde_json::Value::as_u64))
        .and_then(|n| usize::try_from(n).ok());
    FileInfo {
        path: add.path.clone(),
        size: u64::try_from(add.size).unwrap_or(0),
        records,
    }
}

fn read_data_file(path: &Path, schema: &[ColumnSpec]) -> Result<Vec<RawRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let mut records = Vec::new();
    for batch in reader {
        records.extend(batch_to_records(&batch?, schema)?);
    }
    Ok(records)
}

fn fill_missing_columns(record: &mut RawRecord, schema: &[ColumnSpec]) {
    for column in schema {
        if !record.contains(&column.name) {
            record.insert(column.name.clone(), RawValue::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parquet_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".parquet"))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_table_name_validation() {
        let lake = Lake::new("/tmp/lake");
        assert!(lake.table_dir("markets").is_ok());
        assert!(lake.table_dir("../etc").is_err());
        assert!(lake.table_dir("").is_err());
        assert!(lake.table_dir("a/b").is_err());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_data_file() {
        let dir = TempDir::new().unwrap();
        let lake = Lake::new(dir.path());
        lake.try_write("t", &[RawRecord::new().with("n", 1i64)], WriteMode::Append)
            .await
            .unwrap();

        let err = lake
            .try_write("t", &[RawRecord::new().with("n", "one")], WriteMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, LakeError::SchemaConflict { .. }));
        assert_eq!(parquet_files(&dir.path().join("t")), 1);
        assert_eq!(lake.table_info("t").await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_directory_without_log_is_not_a_table() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("t")).unwrap();
        let lake = Lake::new(dir.path());

        assert!(matches!(
            lake.read("t", None).await,
            Err(LakeError::TableNotFound(_))
        ));
        // the first write turns the directory into a table
        assert!(lake.write("t", &[RawRecord::new().with("n", 1i64)], WriteMode::Append).await);
        assert_eq!(lake.list_tables().unwrap(), vec!["t"]);
    }

    #[test]
    fn test_file_info_reads_row_count_from_stats() {
        let add = Add {
            path: "part-00000-x-c000.snappy.parquet".to_string(),
            size: 1024,
            stats: Some(r#"{"numRecords":3,"minValues":{},"maxValues":{},"nullCount":{}}"#.to_string()),
            ..Add::default()
        };
        let info = file_info(&add);
        assert_eq!(info.size, 1024);
        assert_eq!(info.records, Some(3));

        let bare = file_info(&Add::default());
        assert_eq!(bare.records, None);
    }
}
