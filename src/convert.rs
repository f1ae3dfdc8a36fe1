//! Streaming converter: re-projects a file's row batches onto the
//! reconciled schema.
//!
//! Operates batch-by-batch so peak memory is bounded by one batch, not by
//! file size. Output column order follows the reconciled schema regardless
//! of the input file's column order; columns the file never declared are
//! filled with nulls for the batch length.

use std::collections::HashMap;

use crate::batch::{ColumnData, RowBatch, format_decimal};
use crate::error::CoercionError;
use crate::schema::{LogicalType, ReconciledSchema, Schema, TimeUnit};

/// Project one batch read under `from` onto the reconciled schema `to`.
///
/// Row count is preserved exactly. Coercion follows the promotion chosen at
/// reconciliation; values that cannot be represented (unreachable when
/// reconciliation succeeded, but guarded) abort with a `CoercionError`.
pub fn project(
    batch: RowBatch,
    from: &Schema,
    to: &ReconciledSchema,
) -> Result<RowBatch, CoercionError> {
    let num_rows = batch.num_rows();

    let mut by_name: HashMap<String, ColumnData> = from
        .columns()
        .iter()
        .map(|c| c.name.clone())
        .zip(batch.into_columns())
        .collect();

    let columns = to
        .columns()
        .iter()
        .map(|target| match by_name.remove(&target.column.name) {
            Some(data) => coerce_column(data, &target.column.data_type, &target.column.name),
            None => Ok(ColumnData::nulls(&target.column.data_type, num_rows)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RowBatch { columns, num_rows })
}

/// Coerce one column of values to the reconciled type.
pub fn coerce_column(
    data: ColumnData,
    target: &LogicalType,
    column: &str,
) -> Result<ColumnData, CoercionError> {
    match (data, target) {
        (ColumnData::Null(len), ty) => Ok(ColumnData::nulls(ty, len)),

        (d @ ColumnData::Boolean(_), LogicalType::Boolean) => Ok(d),
        (d @ ColumnData::Utf8(_), LogicalType::Utf8) => Ok(d),
        (d @ ColumnData::Binary(_), LogicalType::Binary) => Ok(d),
        (d @ ColumnData::Nested(_), LogicalType::List(_) | LogicalType::Struct(_)) => Ok(d),

        (ColumnData::Int8(v), ty) => coerce_ints(stage_i64(v), ty, column),
        (ColumnData::Int16(v), ty) => coerce_ints(stage_i64(v), ty, column),
        (ColumnData::Int32(v), ty) => coerce_ints(stage_i64(v), ty, column),
        (ColumnData::Int64(v), ty) => coerce_ints(v, ty, column),

        (d @ ColumnData::Float32(_), LogicalType::Float32) => Ok(d),
        (ColumnData::Float32(v), LogicalType::Float64) => {
            Ok(ColumnData::Float64(map_values(v, |x| x as f64)))
        }
        (d @ ColumnData::Float64(_), LogicalType::Float64) => Ok(d),

        (ColumnData::Timestamp(unit, v), LogicalType::Timestamp(target_unit)) => {
            coerce_timestamps(unit, v, *target_unit, column)
        }

        (
            ColumnData::Decimal {
                precision,
                scale,
                values,
            },
            LogicalType::Decimal {
                precision: target_precision,
                scale: target_scale,
            },
        ) => {
            if precision == *target_precision && scale == *target_scale {
                Ok(ColumnData::Decimal {
                    precision,
                    scale,
                    values,
                })
            } else {
                rescale_decimals(values, scale, *target_precision, *target_scale, column)
            }
        }

        (ColumnData::Decimal { scale, values, .. }, LogicalType::Float64) => {
            let divisor = 10_f64.powi(scale as i32);
            Ok(ColumnData::Float64(map_values(values, |x| {
                x as f64 / divisor
            })))
        }

        // Reconciliation never chooses these pairings; guard anyway.
        (data, ty) => Err(CoercionError {
            column: column.to_string(),
            row_offset: 0,
            value: if data.is_empty() {
                "<empty column>".to_string()
            } else {
                data.value_preview(0)
            },
            target: ty.clone(),
        }),
    }
}

fn map_values<V, T>(values: Vec<Option<V>>, f: impl Fn(V) -> T) -> Vec<Option<T>> {
    values.into_iter().map(|o| o.map(&f)).collect()
}

fn stage_i64<V: Into<i64> + Copy>(values: Vec<Option<V>>) -> Vec<Option<i64>> {
    map_values(values, Into::into)
}

/// Elementwise fallible conversion; the first unrepresentable value aborts
/// with its row offset.
fn try_map<V: Copy, T>(
    values: Vec<Option<V>>,
    column: &str,
    target: &LogicalType,
    render: impl Fn(V) -> String,
    f: impl Fn(V) -> Option<T>,
) -> Result<Vec<Option<T>>, CoercionError> {
    values
        .into_iter()
        .enumerate()
        .map(|(row, opt)| match opt {
            None => Ok(None),
            Some(x) => f(x).map(Some).ok_or_else(|| CoercionError {
                column: column.to_string(),
                row_offset: row,
                value: render(x),
                target: target.clone(),
            }),
        })
        .collect()
}

fn coerce_ints(
    values: Vec<Option<i64>>,
    target: &LogicalType,
    column: &str,
) -> Result<ColumnData, CoercionError> {
    let render = |x: i64| x.to_string();
    match target {
        LogicalType::Int8 => Ok(ColumnData::Int8(try_map(values, column, target, render, |x| {
            i8::try_from(x).ok()
        })?)),
        LogicalType::Int16 => Ok(ColumnData::Int16(try_map(
            values,
            column,
            target,
            render,
            |x| i16::try_from(x).ok(),
        )?)),
        LogicalType::Int32 => Ok(ColumnData::Int32(try_map(
            values,
            column,
            target,
            render,
            |x| i32::try_from(x).ok(),
        )?)),
        LogicalType::Int64 => Ok(ColumnData::Int64(values)),
        LogicalType::Float32 => Ok(ColumnData::Float32(map_values(values, |x| x as f32))),
        LogicalType::Float64 => Ok(ColumnData::Float64(map_values(values, |x| x as f64))),
        LogicalType::Decimal { precision, scale } => {
            let (precision, scale) = (*precision, *scale);
            let factor = 10_i128.pow(scale.max(0) as u32);
            let scaled = try_map(values, column, target, render, |x| {
                (x as i128)
                    .checked_mul(factor)
                    .filter(|v| decimal_fits(*v, precision))
            })?;
            Ok(ColumnData::Decimal {
                precision,
                scale,
                values: scaled,
            })
        }
        other => Err(CoercionError {
            column: column.to_string(),
            row_offset: 0,
            value: values
                .iter()
                .flatten()
                .next()
                .map(|x| x.to_string())
                .unwrap_or("null".to_string()),
            target: other.clone(),
        }),
    }
}

fn coerce_timestamps(
    from: TimeUnit,
    values: Vec<Option<i64>>,
    to: TimeUnit,
    column: &str,
) -> Result<ColumnData, CoercionError> {
    if from == to {
        return Ok(ColumnData::Timestamp(to, values));
    }

    let target = LogicalType::Timestamp(to);
    let render = |x: i64| x.to_string();

    let converted = if to.exponent() >= from.exponent() {
        let factor = 10_i64.pow(to.exponent() - from.exponent());
        try_map(values, column, &target, render, |x| x.checked_mul(factor))?
    } else {
        // Coarsening only when every tick converts exactly; truncation is
        // never inferred.
        let factor = 10_i64.pow(from.exponent() - to.exponent());
        try_map(values, column, &target, render, |x| {
            (x % factor == 0).then(|| x / factor)
        })?
    };

    Ok(ColumnData::Timestamp(to, converted))
}

fn rescale_decimals(
    values: Vec<Option<i128>>,
    from_scale: i8,
    precision: u8,
    scale: i8,
    column: &str,
) -> Result<ColumnData, CoercionError> {
    let target = LogicalType::Decimal { precision, scale };
    let render = |x: i128| format_decimal(x, from_scale);

    let rescaled = if scale >= from_scale {
        let factor = 10_i128.pow((scale - from_scale) as u32);
        try_map(values, column, &target, render, |x| {
            x.checked_mul(factor).filter(|v| decimal_fits(*v, precision))
        })?
    } else {
        let factor = 10_i128.pow((from_scale - scale) as u32);
        try_map(values, column, &target, render, |x| {
            (x % factor == 0)
                .then(|| x / factor)
                .filter(|v| decimal_fits(*v, precision))
        })?
    };

    Ok(ColumnData::Decimal {
        precision,
        scale,
        values: rescaled,
    })
}

fn decimal_fits(value: i128, precision: u8) -> bool {
    let digits = value
        .unsigned_abs()
        .checked_ilog10()
        .map(|l| l + 1)
        .unwrap_or(1);
    digits <= precision as u32
}
