//! Columnar row batches: the unit of streaming between pipeline stages.
//!
//! A batch is owned by the stage that produced it and moved, never mutated,
//! when handed to the next stage. Values are held as one tagged vector per
//! column so coercion can be matched exhaustively per logical type.

use anyhow::{Result, ensure};

use crate::schema::{LogicalType, TimeUnit};

/// The values of one column within a batch. Nested (list and struct) columns
/// are carried as JSON trees; their shape is validated at the schema level.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// An all-null column with no value type (length only).
    Null(usize),
    Boolean(Vec<Option<bool>>),
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Binary(Vec<Option<Vec<u8>>>),
    /// Raw tick counts in the given unit since the Unix epoch.
    Timestamp(TimeUnit, Vec<Option<i64>>),
    Decimal {
        precision: u8,
        scale: i8,
        values: Vec<Option<i128>>,
    },
    Nested(Vec<Option<serde_json::Value>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Null(len) => *len,
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Int8(v) => v.len(),
            ColumnData::Int16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
            ColumnData::Binary(v) => v.len(),
            ColumnData::Timestamp(_, v) => v.len(),
            ColumnData::Decimal { values, .. } => values.len(),
            ColumnData::Nested(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An entirely-null column of the given logical type.
    pub fn nulls(data_type: &LogicalType, len: usize) -> ColumnData {
        match data_type {
            LogicalType::Null => ColumnData::Null(len),
            LogicalType::Boolean => ColumnData::Boolean(vec![None; len]),
            LogicalType::Int8 => ColumnData::Int8(vec![None; len]),
            LogicalType::Int16 => ColumnData::Int16(vec![None; len]),
            LogicalType::Int32 => ColumnData::Int32(vec![None; len]),
            LogicalType::Int64 => ColumnData::Int64(vec![None; len]),
            LogicalType::Float32 => ColumnData::Float32(vec![None; len]),
            LogicalType::Float64 => ColumnData::Float64(vec![None; len]),
            LogicalType::Utf8 => ColumnData::Utf8(vec![None; len]),
            LogicalType::Binary => ColumnData::Binary(vec![None; len]),
            LogicalType::Timestamp(unit) => ColumnData::Timestamp(*unit, vec![None; len]),
            LogicalType::Decimal { precision, scale } => ColumnData::Decimal {
                precision: *precision,
                scale: *scale,
                values: vec![None; len],
            },
            LogicalType::List(_) | LogicalType::Struct(_) => ColumnData::Nested(vec![None; len]),
        }
    }

    /// Short rendering of one value for error messages.
    pub fn value_preview(&self, row: usize) -> String {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|x| x.to_string()).unwrap_or("null".into())
        }

        let rendered = match self {
            ColumnData::Null(_) => "null".to_string(),
            ColumnData::Boolean(v) => opt(&v[row]),
            ColumnData::Int8(v) => opt(&v[row]),
            ColumnData::Int16(v) => opt(&v[row]),
            ColumnData::Int32(v) => opt(&v[row]),
            ColumnData::Int64(v) => opt(&v[row]),
            ColumnData::Float32(v) => opt(&v[row]),
            ColumnData::Float64(v) => opt(&v[row]),
            ColumnData::Utf8(v) => opt(&v[row]),
            ColumnData::Binary(v) => v[row]
                .as_ref()
                .map(hex::encode)
                .unwrap_or("null".to_string()),
            ColumnData::Timestamp(_, v) => opt(&v[row]),
            ColumnData::Decimal { scale, values, .. } => values[row]
                .map(|x| format_decimal(x, *scale))
                .unwrap_or("null".to_string()),
            ColumnData::Nested(v) => v[row]
                .as_ref()
                .map(|x| x.to_string())
                .unwrap_or("null".to_string()),
        };

        if rendered.chars().count() > 40 {
            let truncated: String = rendered.chars().take(40).collect();
            format!("{}...", truncated)
        } else {
            rendered
        }
    }
}

/// Render a scaled decimal integer as a plain decimal string.
pub(crate) fn format_decimal(value: i128, scale: i8) -> String {
    if scale <= 0 {
        return value.to_string();
    }
    let divisor = 10_i128.pow(scale as u32);
    let int_part = value / divisor;
    let frac_part = (value % divisor).unsigned_abs();
    let sign = if value < 0 && int_part == 0 { "-" } else { "" };
    format!(
        "{}{}.{:0width$}",
        sign,
        int_part,
        frac_part,
        width = scale as usize
    )
}

/// A fixed-size columnar block of rows. All columns have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub(crate) columns: Vec<ColumnData>,
    pub(crate) num_rows: usize,
}

impl RowBatch {
    pub fn new(columns: Vec<ColumnData>) -> Result<Self> {
        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for (idx, column) in columns.iter().enumerate() {
            ensure!(
                column.len() == num_rows,
                "column {} has {} rows, expected {}",
                idx,
                column.len(),
                num_rows
            );
        }
        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> &ColumnData {
        &self.columns[idx]
    }

    pub fn into_columns(self) -> Vec<ColumnData> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_rejects_uneven_columns() {
        let result = RowBatch::new(vec![
            ColumnData::Int32(vec![Some(1), Some(2)]),
            ColumnData::Utf8(vec![Some("a".into())]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_row_count() {
        let batch = RowBatch::new(vec![
            ColumnData::Int32(vec![Some(1), None, Some(3)]),
            ColumnData::Null(3),
        ])
        .unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn test_nulls_constructor_matches_type() {
        let col = ColumnData::nulls(&LogicalType::Timestamp(TimeUnit::Micros), 4);
        assert_eq!(col.len(), 4);
        assert!(matches!(
            col,
            ColumnData::Timestamp(TimeUnit::Micros, ref v) if v.iter().all(Option::is_none)
        ));

        let col = ColumnData::nulls(&LogicalType::List(Box::new(LogicalType::Int32)), 2);
        assert!(matches!(col, ColumnData::Nested(ref v) if v.len() == 2));
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(12345, 2), "123.45");
        assert_eq!(format_decimal(1, 2), "0.01");
        assert_eq!(format_decimal(-12345, 2), "-123.45");
        assert_eq!(format_decimal(-5, 2), "-0.05");
        assert_eq!(format_decimal(12345, 0), "12345");
    }

    #[test]
    fn test_value_preview_truncates() {
        let long = "x".repeat(100);
        let col = ColumnData::Utf8(vec![Some(long)]);
        let preview = col.value_preview(0);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= 43);
    }
}
