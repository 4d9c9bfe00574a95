//! Column typing for schema-less records.
//!
//! Column types are inferred from the values present in a write and merged
//! with the Delta table's existing schema. Nested values and columns whose
//! values disagree on kind are kept as JSON text so they survive a round
//! trip; the field metadata flag that marks them is stored in the Delta
//! schema.

use std::collections::HashMap;
use std::sync::Arc;

use deltalake::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use market_warehouse_core::{RawRecord, RawValue};
use serde::{Deserialize, Serialize};

use crate::error::{LakeError, Result};

/// Field metadata key marking how a UTF-8 column is encoded.
pub const ENCODING_KEY: &str = "mw.encoding";
/// Encoding value for columns holding JSON text.
pub const JSON_ENCODING: &str = "json";

/// UTC extraction instant appended to every written record.
pub const EXTRACTION_TIMESTAMP: &str = "_extraction_timestamp";
/// Calendar date of the extraction instant.
pub const EXTRACTION_DATE: &str = "_extraction_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Every value seen so far was null.
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Nested or mixed-kind values stored as JSON text.
    Json,
    TimestampMicros,
    Date,
}

impl ColumnType {
    #[must_use]
    pub fn to_arrow(self) -> DataType {
        match self {
            Self::Null | Self::Utf8 | Self::Json => DataType::Utf8,
            Self::Boolean => DataType::Boolean,
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
            Self::TimestampMicros => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            Self::Date => DataType::Date32,
        }
    }

    fn of_value(value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Null => None,
            RawValue::Bool(_) => Some(Self::Boolean),
            RawValue::Int(_) => Some(Self::Int64),
            RawValue::Float(_) => Some(Self::Float64),
            RawValue::String(_) => Some(Self::Utf8),
            RawValue::List(_) | RawValue::Map(_) => Some(Self::Json),
        }
    }

    /// Combines two kinds seen within the same write.
    fn unify(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Null, x) | (x, Self::Null) => x,
            (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Self::Float64,
            _ => Self::Json,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int64 => "long",
            Self::Float64 => "double",
            Self::Utf8 => "string",
            Self::Json => "json",
            Self::TimestampMicros => "timestamp",
            Self::Date => "date",
        };
        f.write_str(name)
    }
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Column read back from a Delta table schema. A column that was all
    /// null when first written comes back as `Utf8`.
    ///
    /// # Errors
    ///
    /// Returns [`LakeError::Corrupt`] for Arrow types this store never writes.
    pub fn from_field(field: &Field) -> Result<Self> {
        let column_type = match field.data_type() {
            DataType::Null => ColumnType::Null,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Int64 => ColumnType::Int64,
            DataType::Float64 => ColumnType::Float64,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View if is_json_field(field) => {
                ColumnType::Json
            }
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnType::Utf8,
            DataType::Timestamp(TimeUnit::Microsecond, _) => ColumnType::TimestampMicros,
            DataType::Date32 => ColumnType::Date,
            other => {
                return Err(LakeError::Corrupt(format!(
                    "unsupported column type {other} for '{}'",
                    field.name()
                )))
            }
        };
        Ok(Self::new(field.name(), column_type))
    }

    fn to_field(&self) -> Field {
        let field = Field::new(&self.name, self.column_type.to_arrow(), true);
        if self.column_type == ColumnType::Json {
            field.with_metadata(HashMap::from([(
                ENCODING_KEY.to_string(),
                JSON_ENCODING.to_string(),
            )]))
        } else {
            field
        }
    }
}

/// Ordered column list of a table version.
pub type TableSchema = Vec<ColumnSpec>;

/// Infers column types from `records`, in first-seen field order.
///
/// The extraction metadata columns are always appended last.
#[must_use]
pub fn infer(records: &[RawRecord]) -> TableSchema {
    let mut order: Vec<String> = Vec::new();
    let mut types: HashMap<String, ColumnType> = HashMap::new();

    for record in records {
        for (name, value) in record.iter() {
            if is_metadata_column(name) {
                continue;
            }
            let seen = ColumnType::of_value(value).unwrap_or(ColumnType::Null);
            match types.get_mut(name) {
                Some(existing) => *existing = existing.unify(seen),
                None => {
                    order.push(name.to_string());
                    types.insert(name.to_string(), seen);
                }
            }
        }
    }

    let mut schema: TableSchema = order
        .into_iter()
        .map(|name| {
            let column_type = types.get(&name).copied().unwrap_or(ColumnType::Null);
            ColumnSpec::new(name, column_type)
        })
        .collect();
    schema.extend(metadata_columns());
    schema
}

/// Merges an incoming schema into the existing one.
///
/// Existing columns keep their position; new columns are appended before
/// the metadata columns. With `strict` set (appends), an incoming kind the
/// existing column cannot hold is a [`LakeError::SchemaConflict`].
/// Otherwise (overwrites, which drop every existing file) the incoming
/// type replaces the existing one.
///
/// # Errors
///
/// Returns a schema conflict in strict mode.
pub fn merge(existing: &[ColumnSpec], incoming: &[ColumnSpec], strict: bool) -> Result<TableSchema> {
    let mut merged: TableSchema = existing
        .iter()
        .filter(|c| !is_metadata_column(&c.name))
        .cloned()
        .collect();

    for column in incoming.iter().filter(|c| !is_metadata_column(&c.name)) {
        match merged.iter_mut().find(|c| c.name == column.name) {
            Some(current) => {
                current.column_type =
                    widen(&column.name, current.column_type, column.column_type, strict)?;
            }
            None => merged.push(column.clone()),
        }
    }

    merged.extend(metadata_columns());
    Ok(merged)
}

fn widen(name: &str, existing: ColumnType, incoming: ColumnType, strict: bool) -> Result<ColumnType> {
    use ColumnType::{Float64, Int64, Json, Null};

    let widened = match (existing, incoming) {
        (a, b) if a == b => Some(a),
        (x, Null) => Some(x),
        (Null, x) => Some(x),
        (Float64, Int64) => Some(Float64),
        (Json, _) => Some(Json),
        _ => None,
    };

    match widened {
        Some(t) => Ok(t),
        None if !strict => Ok(incoming),
        None => Err(LakeError::SchemaConflict {
            column: name.to_string(),
            existing: existing.to_string(),
            incoming: incoming.to_string(),
        }),
    }
}

#[must_use]
pub fn is_metadata_column(name: &str) -> bool {
    name == EXTRACTION_TIMESTAMP || name == EXTRACTION_DATE
}

fn metadata_columns() -> [ColumnSpec; 2] {
    [
        ColumnSpec::new(EXTRACTION_TIMESTAMP, ColumnType::TimestampMicros),
        ColumnSpec::new(EXTRACTION_DATE, ColumnType::Date),
    ]
}

/// True if `field` carries the JSON text flag.
#[must_use]
pub fn is_json_field(field: &Field) -> bool {
    field
        .metadata()
        .get(ENCODING_KEY)
        .is_some_and(|e| e == JSON_ENCODING)
}

/// Reads a table schema back from the Arrow schema of a Delta snapshot.
///
/// # Errors
///
/// Returns [`LakeError::Corrupt`] for a column this store cannot decode.
pub fn from_arrow_schema(schema: &Schema) -> Result<TableSchema> {
    schema
        .fields()
        .iter()
        .map(|field| ColumnSpec::from_field(field))
        .collect()
}

/// Builds the Arrow schema used to write data files.
#[must_use]
pub fn to_arrow_schema(schema: &[ColumnSpec]) -> Arc<Schema> {
    Arc::new(Schema::new(
        schema.iter().map(ColumnSpec::to_field).collect::<Vec<_>>(),
    ))
}

/// Renders a schema as `name: type` lines.
#[must_use]
pub fn render(schema: &[ColumnSpec]) -> String {
    schema
        .iter()
        .map(|c| format!("{}: {}", c.name, c.column_type))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_type(schema: &[ColumnSpec], name: &str) -> ColumnType {
        schema
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
            .unwrap()
    }

    #[test]
    fn test_infer_kinds() {
        let records = vec![
            RawRecord::new()
                .with("id", "1")
                .with("volume", 3i64)
                .with("active", true)
                .with("tags", RawValue::List(vec![RawValue::from("a")]))
                .with("empty", RawValue::Null),
            RawRecord::new().with("id", "2").with("volume", 2.5),
        ];

        let schema = infer(&records);
        assert_eq!(column_type(&schema, "id"), ColumnType::Utf8);
        assert_eq!(column_type(&schema, "volume"), ColumnType::Float64);
        assert_eq!(column_type(&schema, "active"), ColumnType::Boolean);
        assert_eq!(column_type(&schema, "tags"), ColumnType::Json);
        assert_eq!(column_type(&schema, "empty"), ColumnType::Null);
        assert_eq!(schema[schema.len() - 2].name, EXTRACTION_TIMESTAMP);
        assert_eq!(schema[schema.len() - 1].name, EXTRACTION_DATE);
    }

    #[test]
    fn test_mixed_kinds_become_json() {
        let records = vec![
            RawRecord::new().with("x", "text"),
            RawRecord::new().with("x", 5i64),
        ];
        assert_eq!(column_type(&infer(&records), "x"), ColumnType::Json);
    }

    #[test]
    fn test_merge_adds_columns_and_widens() {
        let existing = vec![
            ColumnSpec::new("a", ColumnType::Float64),
            ColumnSpec::new("b", ColumnType::Null),
        ];
        let incoming = vec![
            ColumnSpec::new("a", ColumnType::Int64),
            ColumnSpec::new("b", ColumnType::Utf8),
            ColumnSpec::new("c", ColumnType::Boolean),
        ];

        let merged = merge(&existing, &incoming, true).unwrap();
        let names: Vec<_> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", EXTRACTION_TIMESTAMP, EXTRACTION_DATE]);
        assert_eq!(column_type(&merged, "a"), ColumnType::Float64);
        assert_eq!(column_type(&merged, "b"), ColumnType::Utf8);
    }

    #[test]
    fn test_strict_merge_rejects_narrowing() {
        let existing = vec![ColumnSpec::new("a", ColumnType::Int64)];
        let incoming = vec![ColumnSpec::new("a", ColumnType::Float64)];

        let err = merge(&existing, &incoming, true).unwrap_err();
        assert!(matches!(err, LakeError::SchemaConflict { ref column, .. } if column == "a"));

        let relaxed = merge(&existing, &incoming, false).unwrap();
        assert_eq!(column_type(&relaxed, "a"), ColumnType::Float64);
    }

    #[test]
    fn test_arrow_schema_reads_back() {
        let schema = vec![
            ColumnSpec::new("id", ColumnType::Utf8),
            ColumnSpec::new("volume", ColumnType::Float64),
            ColumnSpec::new("tags", ColumnType::Json),
            ColumnSpec::new("empty", ColumnType::Null),
            ColumnSpec::new(EXTRACTION_TIMESTAMP, ColumnType::TimestampMicros),
            ColumnSpec::new(EXTRACTION_DATE, ColumnType::Date),
        ];
        let back = from_arrow_schema(&to_arrow_schema(&schema)).unwrap();

        assert_eq!(back[..3], schema[..3]);
        // all-null columns are stored as text
        assert_eq!(column_type(&back, "empty"), ColumnType::Utf8);
        assert_eq!(back[4..], schema[4..]);
    }

    #[test]
    fn test_unsupported_arrow_type_is_corrupt() {
        let schema = Schema::new(vec![Field::new("n", DataType::Int32, true)]);
        assert!(matches!(from_arrow_schema(&schema), Err(LakeError::Corrupt(_))));
    }

    #[test]
    fn test_json_field_metadata() {
        let schema = to_arrow_schema(&[ColumnSpec::new("tags", ColumnType::Json)]);
        let field = schema.field(0);
        assert_eq!(field.data_type(), &DataType::Utf8);
        assert_eq!(
            field.metadata().get(ENCODING_KEY).map(String::as_str),
            Some(JSON_ENCODING)
        );
    }
}
