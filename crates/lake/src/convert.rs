//! Conversion between raw records and Arrow record batches.

use std::sync::Arc;

use deltalake::arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use deltalake::arrow::datatypes::{
    DataType, Date32Type, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType,
};
use deltalake::arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use market_warehouse_core::{RawRecord, RawValue};

use crate::error::{LakeError, Result};
use crate::schema::{
    is_json_field, to_arrow_schema, ColumnSpec, ColumnType, EXTRACTION_DATE, EXTRACTION_TIMESTAMP,
};

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Builds a batch for `records` under `schema`, stamping extraction metadata.
///
/// Fields absent from a record become nulls. Values are coerced to the
/// column type; a value the column cannot hold is a schema conflict.
///
/// # Errors
///
/// Returns an error if a value does not fit its column or Arrow rejects the batch.
pub fn records_to_batch(
    records: &[RawRecord],
    schema: &[ColumnSpec],
    extracted_at: DateTime<Utc>,
) -> Result<RecordBatch> {
    let arrow_schema = to_arrow_schema(schema);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.len());

    for column in schema {
        let array: ArrayRef = match column.name.as_str() {
            EXTRACTION_TIMESTAMP => Arc::new(
                TimestampMicrosecondArray::from(vec![extracted_at.timestamp_micros(); records.len()])
                    .with_timezone("UTC"),
            ),
            EXTRACTION_DATE => {
                let days = extracted_at.date_naive().num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE;
                Arc::new(Date32Array::from(vec![days; records.len()]))
            }
            name => build_column(name, column.column_type, records)?,
        };
        columns.push(array);
    }

    Ok(RecordBatch::try_new(arrow_schema, columns)?)
}

fn build_column(name: &str, column_type: ColumnType, records: &[RawRecord]) -> Result<ArrayRef> {
    let values = records.iter().map(|r| r.get(name));
    let conflict = |value: &RawValue| LakeError::SchemaConflict {
        column: name.to_string(),
        existing: column_type.to_string(),
        incoming: value_kind(value).to_string(),
    };

    let array: ArrayRef = match column_type {
        ColumnType::Null => Arc::new(StringArray::from(vec![None::<String>; records.len()])),
        ColumnType::Boolean => Arc::new(BooleanArray::from(
            values
                .map(|v| v.map(|v| v.as_bool().ok_or_else(|| conflict(v))).transpose())
                .collect::<Result<Vec<_>>>()?,
        )),
        ColumnType::Int64 => Arc::new(Int64Array::from(
            values
                .map(|v| {
                    v.map(|v| match v {
                        RawValue::Int(i) => Ok(*i),
                        other => Err(conflict(other)),
                    })
                    .transpose()
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        ColumnType::Float64 => Arc::new(Float64Array::from(
            values
                .map(|v| v.map(|v| v.as_f64().ok_or_else(|| conflict(v))).transpose())
                .collect::<Result<Vec<_>>>()?,
        )),
        ColumnType::Utf8 => Arc::new(StringArray::from(
            values
                .map(|v| {
                    v.map(|v| v.as_str().map(str::to_string).ok_or_else(|| conflict(v)))
                        .transpose()
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        ColumnType::Json => Arc::new(StringArray::from(
            values
                .map(|v| v.map(|v| v.to_json().to_string()))
                .collect::<Vec<_>>(),
        )),
        ColumnType::TimestampMicros | ColumnType::Date => {
            return Err(LakeError::SchemaConflict {
                column: name.to_string(),
                existing: column_type.to_string(),
                incoming: "record field".to_string(),
            });
        }
    };
    Ok(array)
}

fn value_kind(value: &RawValue) -> &'static str {
    match value {
        RawValue::Null => "null",
        RawValue::Bool(_) => "boolean",
        RawValue::Int(_) => "long",
        RawValue::Float(_) => "double",
        RawValue::String(_) => "string",
        RawValue::List(_) => "list",
        RawValue::Map(_) => "map",
    }
}

/// Converts a batch back into records, one per row.
///
/// Columns that are JSON in `table_schema`, or flagged as JSON in the
/// batch itself, are decoded to nested values. Timestamp and date columns
/// come back as RFC 3339 and `YYYY-MM-DD` strings.
///
/// # Errors
///
/// Returns an error for column types this store never writes.
pub fn batch_to_records(batch: &RecordBatch, table_schema: &[ColumnSpec]) -> Result<Vec<RawRecord>> {
    let mut records = vec![RawRecord::new(); batch.num_rows()];
    let schema = batch.schema();

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let is_json = is_json_field(field)
            || table_schema
                .iter()
                .any(|c| c.name == *field.name() && c.column_type == ColumnType::Json);

        for (row, record) in records.iter_mut().enumerate() {
            let value = cell(array, row, is_json).ok_or_else(|| {
                LakeError::Corrupt(format!(
                    "unsupported column type {} for '{}'",
                    array.data_type(),
                    field.name()
                ))
            })?;
            record.insert(field.name().clone(), value);
        }
    }
    Ok(records)
}

fn cell(array: &ArrayRef, row: usize, is_json: bool) -> Option<RawValue> {
    if array.is_null(row) {
        return Some(RawValue::Null);
    }
    let value = match array.data_type() {
        DataType::Null => RawValue::Null,
        DataType::Boolean => RawValue::Bool(array.as_boolean().value(row)),
        DataType::Int64 => RawValue::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::Float64 => RawValue::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let text = string_value(array, row);
            if is_json {
                serde_json::from_str::<serde_json::Value>(text)
                    .map_or_else(|_| RawValue::from(text), RawValue::from)
            } else {
                RawValue::from(text)
            }
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = array.as_primitive::<TimestampMicrosecondType>().value(row);
            DateTime::<Utc>::from_timestamp_micros(micros).map_or(RawValue::Null, |ts| {
                RawValue::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            })
        }
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(row);
            NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
                .map_or(RawValue::Null, |d| RawValue::String(d.format("%Y-%m-%d").to_string()))
        }
        _ => return None,
    };
    Some(value)
}

fn string_value(array: &ArrayRef, row: usize) -> &str {
    match array.data_type() {
        DataType::LargeUtf8 => array.as_string::<i64>().value(row),
        DataType::Utf8View => array.as_string_view().value(row),
        _ => array.as_string::<i32>().value(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::infer;
    use chrono::TimeZone;

    fn extracted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_batch_round_trip_preserves_values() {
        let mut nested = RawRecord::new();
        nested.insert("label", "Politics");
        let records = vec![
            RawRecord::new()
                .with("id", "m1")
                .with("volume", 10.5)
                .with("active", true)
                .with("tags", RawValue::List(vec![RawValue::Map(nested.clone())])),
            RawRecord::new().with("id", "m2").with("volume", 3i64),
        ];
        let schema = infer(&records);

        let batch = records_to_batch(&records, &schema, extracted_at()).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let back = batch_to_records(&batch, &schema).unwrap();
        assert_eq!(back[0].get("id"), Some(&RawValue::from("m1")));
        assert_eq!(back[0].get("volume"), Some(&RawValue::Float(10.5)));
        assert_eq!(back[0].get("active"), Some(&RawValue::Bool(true)));
        assert_eq!(
            back[0].get("tags"),
            Some(&RawValue::List(vec![RawValue::Map(nested)]))
        );
        assert_eq!(back[1].get("volume"), Some(&RawValue::Float(3.0)));
        assert!(back[1].get("active").is_none());
        assert_eq!(
            back[1].get(EXTRACTION_TIMESTAMP).and_then(RawValue::as_str),
            Some("2024-03-09T14:30:00.000000Z")
        );
        assert_eq!(
            back[1].get(EXTRACTION_DATE).and_then(RawValue::as_str),
            Some("2024-03-09")
        );
    }

    #[test]
    fn test_value_outside_column_type_is_conflict() {
        let schema = vec![ColumnSpec::new("n", ColumnType::Int64)];
        let records = vec![RawRecord::new().with("n", "seven")];
        let err = records_to_batch(&records, &schema, extracted_at()).unwrap_err();
        assert!(matches!(err, LakeError::SchemaConflict { .. }));
    }
}
