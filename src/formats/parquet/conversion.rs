//! Conversion from Arrow schemas and RecordBatches into the pipeline's
//! schema model and typed row batches.
//!
//! Values keep their native types so downstream coercion stays exhaustive
//! over the logical type set. Unsigned integers widen into the next signed
//! width (`u64` becomes `decimal(20,0)`), dates render to ISO strings, and
//! nested list/struct values are carried as JSON trees.

use arrow::array::{
    Array, ArrayRef, ArrowPrimitiveType, FixedSizeBinaryArray, as_boolean_array,
    as_generic_binary_array, as_large_list_array, as_largestring_array, as_list_array,
    as_primitive_array, as_string_array, as_struct_array,
};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, Schema as ArrowSchema, TimeUnit as ArrowTimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;

use crate::batch::{ColumnData, RowBatch, format_decimal};
use crate::error::ReadError;
use crate::schema::{Column, LogicalType, Schema, TimeUnit};

fn unsupported(data_type: &DataType) -> ReadError {
    ReadError::Unsupported {
        reason: format!("unsupported column type: {:?}", data_type),
    }
}

/// Map an Arrow field type onto the closed logical type set.
pub fn logical_type_from_arrow(data_type: &DataType) -> Result<LogicalType, ReadError> {
    Ok(match data_type {
        DataType::Null => LogicalType::Null,
        DataType::Boolean => LogicalType::Boolean,
        DataType::Int8 => LogicalType::Int8,
        DataType::Int16 => LogicalType::Int16,
        DataType::Int32 => LogicalType::Int32,
        DataType::Int64 => LogicalType::Int64,
        DataType::UInt8 => LogicalType::Int16,
        DataType::UInt16 => LogicalType::Int32,
        DataType::UInt32 => LogicalType::Int64,
        // u64 exceeds every signed width; 20 digits hold its full range.
        DataType::UInt64 => LogicalType::Decimal {
            precision: 20,
            scale: 0,
        },
        DataType::Float32 => LogicalType::Float32,
        DataType::Float64 => LogicalType::Float64,
        DataType::Utf8 | DataType::LargeUtf8 => LogicalType::Utf8,
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => {
            LogicalType::Binary
        }
        DataType::Date32 | DataType::Date64 => LogicalType::Utf8,
        DataType::Timestamp(unit, _) => LogicalType::Timestamp(time_unit_from_arrow(unit)),
        DataType::Decimal128(precision, scale) => LogicalType::Decimal {
            precision: *precision,
            scale: *scale,
        },
        DataType::List(field) | DataType::LargeList(field) => {
            LogicalType::List(Box::new(logical_type_from_arrow(field.data_type())?))
        }
        DataType::Struct(fields) => {
            let mut columns = Vec::with_capacity(fields.len());
            for field in fields {
                columns.push(Column::new(
                    field.name(),
                    logical_type_from_arrow(field.data_type())?,
                    field.is_nullable(),
                ));
            }
            LogicalType::Struct(columns)
        }
        other => return Err(unsupported(other)),
    })
}

fn time_unit_from_arrow(unit: &ArrowTimeUnit) -> TimeUnit {
    match unit {
        ArrowTimeUnit::Second => TimeUnit::Seconds,
        ArrowTimeUnit::Millisecond => TimeUnit::Millis,
        ArrowTimeUnit::Microsecond => TimeUnit::Micros,
        ArrowTimeUnit::Nanosecond => TimeUnit::Nanos,
    }
}

/// Decode a file's native schema.
pub fn schema_from_arrow(schema: &ArrowSchema) -> Result<Schema, ReadError> {
    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        columns.push(Column::new(
            field.name(),
            logical_type_from_arrow(field.data_type())?,
            field.is_nullable(),
        ));
    }
    Schema::new(columns).map_err(|e| ReadError::Corrupt {
        reason: e.to_string(),
    })
}

/// Convert one decoded Arrow batch into the pipeline representation.
pub fn row_batch_from_arrow(batch: &RecordBatch) -> Result<RowBatch, ReadError> {
    let columns = batch
        .columns()
        .iter()
        .map(|array| column_from_array(array))
        .collect::<Result<Vec<_>, _>>()?;

    RowBatch::new(columns).map_err(|e| ReadError::Corrupt {
        reason: e.to_string(),
    })
}

fn extract_primitive<T: ArrowPrimitiveType>(array: &dyn Array) -> Vec<Option<T::Native>> {
    as_primitive_array::<T>(array).iter().collect()
}

fn extract_widened<T, U>(array: &dyn Array, widen: impl Fn(T::Native) -> U) -> Vec<Option<U>>
where
    T: ArrowPrimitiveType,
{
    as_primitive_array::<T>(array)
        .iter()
        .map(|v| v.map(&widen))
        .collect()
}

fn column_from_array(array: &ArrayRef) -> Result<ColumnData, ReadError> {
    Ok(match array.data_type() {
        DataType::Null => ColumnData::Null(array.len()),
        DataType::Boolean => ColumnData::Boolean(as_boolean_array(array).iter().collect()),

        DataType::Int8 => ColumnData::Int8(extract_primitive::<Int8Type>(array)),
        DataType::Int16 => ColumnData::Int16(extract_primitive::<Int16Type>(array)),
        DataType::Int32 => ColumnData::Int32(extract_primitive::<Int32Type>(array)),
        DataType::Int64 => ColumnData::Int64(extract_primitive::<Int64Type>(array)),

        DataType::UInt8 => ColumnData::Int16(extract_widened::<UInt8Type, _>(array, i16::from)),
        DataType::UInt16 => ColumnData::Int32(extract_widened::<UInt16Type, _>(array, i32::from)),
        DataType::UInt32 => ColumnData::Int64(extract_widened::<UInt32Type, _>(array, i64::from)),
        DataType::UInt64 => ColumnData::Decimal {
            precision: 20,
            scale: 0,
            values: extract_widened::<UInt64Type, _>(array, i128::from),
        },

        DataType::Float32 => ColumnData::Float32(extract_primitive::<Float32Type>(array)),
        DataType::Float64 => ColumnData::Float64(extract_primitive::<Float64Type>(array)),

        DataType::Utf8 => ColumnData::Utf8(
            as_string_array(array)
                .iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        ),
        DataType::LargeUtf8 => ColumnData::Utf8(
            as_largestring_array(array)
                .iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        ),

        DataType::Binary => ColumnData::Binary(
            as_generic_binary_array::<i32>(array)
                .iter()
                .map(|v| v.map(<[u8]>::to_vec))
                .collect(),
        ),
        DataType::LargeBinary => ColumnData::Binary(
            as_generic_binary_array::<i64>(array)
                .iter()
                .map(|v| v.map(<[u8]>::to_vec))
                .collect(),
        ),
        DataType::FixedSizeBinary(_) => {
            let arr = array
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            ColumnData::Binary(arr.iter().map(|v| v.map(<[u8]>::to_vec)).collect())
        }

        DataType::Date32 => ColumnData::Utf8(
            extract_primitive::<Date32Type>(array)
                .into_iter()
                .map(|v| v.and_then(date32_string))
                .collect(),
        ),
        DataType::Date64 => ColumnData::Utf8(
            extract_primitive::<Date64Type>(array)
                .into_iter()
                .map(|v| v.and_then(date64_string))
                .collect(),
        ),

        DataType::Timestamp(unit, _) => {
            let values = match unit {
                ArrowTimeUnit::Second => extract_primitive::<TimestampSecondType>(array),
                ArrowTimeUnit::Millisecond => extract_primitive::<TimestampMillisecondType>(array),
                ArrowTimeUnit::Microsecond => extract_primitive::<TimestampMicrosecondType>(array),
                ArrowTimeUnit::Nanosecond => extract_primitive::<TimestampNanosecondType>(array),
            };
            ColumnData::Timestamp(time_unit_from_arrow(unit), values)
        }

        DataType::Decimal128(precision, scale) => ColumnData::Decimal {
            precision: *precision,
            scale: *scale,
            values: extract_primitive::<Decimal128Type>(array),
        },

        DataType::List(_) | DataType::LargeList(_) | DataType::Struct(_) => {
            let mut values = Vec::with_capacity(array.len());
            for row in 0..array.len() {
                values.push(if array.is_null(row) {
                    None
                } else {
                    Some(json_value(array.as_ref(), row)?)
                });
            }
            ColumnData::Nested(values)
        }

        other => return Err(unsupported(other)),
    })
}

/// Render one nested value as JSON, recursing through lists and structs.
fn json_value(array: &dyn Array, row: usize) -> Result<serde_json::Value, ReadError> {
    use serde_json::Value;

    if array.is_null(row) {
        return Ok(Value::Null);
    }

    Ok(match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::from(as_boolean_array(array).value(row)),

        DataType::Int8 => Value::from(as_primitive_array::<Int8Type>(array).value(row)),
        DataType::Int16 => Value::from(as_primitive_array::<Int16Type>(array).value(row)),
        DataType::Int32 => Value::from(as_primitive_array::<Int32Type>(array).value(row)),
        DataType::Int64 => Value::from(as_primitive_array::<Int64Type>(array).value(row)),
        DataType::UInt8 => Value::from(as_primitive_array::<UInt8Type>(array).value(row)),
        DataType::UInt16 => Value::from(as_primitive_array::<UInt16Type>(array).value(row)),
        DataType::UInt32 => Value::from(as_primitive_array::<UInt32Type>(array).value(row)),
        DataType::UInt64 => Value::from(as_primitive_array::<UInt64Type>(array).value(row)),

        DataType::Float32 => {
            float_json(as_primitive_array::<Float32Type>(array).value(row) as f64)
        }
        DataType::Float64 => float_json(as_primitive_array::<Float64Type>(array).value(row)),

        DataType::Utf8 => Value::from(as_string_array(array).value(row)),
        DataType::LargeUtf8 => Value::from(as_largestring_array(array).value(row)),

        DataType::Binary => Value::from(hex::encode(as_generic_binary_array::<i32>(array).value(row))),
        DataType::LargeBinary => {
            Value::from(hex::encode(as_generic_binary_array::<i64>(array).value(row)))
        }

        DataType::Date32 => date32_string(as_primitive_array::<Date32Type>(array).value(row))
            .map(Value::from)
            .unwrap_or(Value::Null),
        DataType::Date64 => date64_string(as_primitive_array::<Date64Type>(array).value(row))
            .map(Value::from)
            .unwrap_or(Value::Null),

        DataType::Timestamp(unit, _) => {
            let ticks = match unit {
                ArrowTimeUnit::Second => as_primitive_array::<TimestampSecondType>(array).value(row),
                ArrowTimeUnit::Millisecond => {
                    as_primitive_array::<TimestampMillisecondType>(array).value(row)
                }
                ArrowTimeUnit::Microsecond => {
                    as_primitive_array::<TimestampMicrosecondType>(array).value(row)
                }
                ArrowTimeUnit::Nanosecond => {
                    as_primitive_array::<TimestampNanosecondType>(array).value(row)
                }
            };
            timestamp_string(time_unit_from_arrow(unit), ticks)
                .map(Value::from)
                .unwrap_or(Value::Null)
        }

        DataType::Decimal128(_, scale) => Value::from(format_decimal(
            as_primitive_array::<Decimal128Type>(array).value(row),
            *scale,
        )),

        DataType::List(_) => {
            let values = as_list_array(array).value(row);
            json_array(values.as_ref())?
        }
        DataType::LargeList(_) => {
            let values = as_large_list_array(array).value(row);
            json_array(values.as_ref())?
        }
        DataType::Struct(fields) => {
            let arr = as_struct_array(array);
            let mut object = serde_json::Map::with_capacity(fields.len());
            for (field, column) in fields.iter().zip(arr.columns()) {
                object.insert(field.name().clone(), json_value(column.as_ref(), row)?);
            }
            Value::Object(object)
        }

        other => return Err(unsupported(other)),
    })
}

fn json_array(values: &dyn Array) -> Result<serde_json::Value, ReadError> {
    let mut items = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        items.push(json_value(values, i)?);
    }
    Ok(serde_json::Value::Array(items))
}

fn float_json(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn date32_string(days: i32) -> Option<String> {
    chrono::NaiveDate::from_ymd_opt(1970, 1, 1)?
        .checked_add_signed(chrono::Duration::days(days as i64))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn date64_string(millis: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Render epoch ticks in the given unit as `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn timestamp_string(unit: TimeUnit, ticks: i64) -> Option<String> {
    let datetime = match unit {
        TimeUnit::Seconds => chrono::DateTime::from_timestamp(ticks, 0),
        TimeUnit::Millis => chrono::DateTime::from_timestamp_millis(ticks),
        TimeUnit::Micros => chrono::DateTime::from_timestamp_micros(ticks),
        TimeUnit::Nanos => Some(chrono::DateTime::from_timestamp_nanos(ticks)),
    };
    datetime.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
