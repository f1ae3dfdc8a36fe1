//! Typed schema model: logical column types and the pairwise merge rules
//! used by reconciliation.

mod reconcile;

pub use reconcile::{ReconciledColumn, ReconciledSchema, reconcile};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TypeConflict;

/// Timestamp precision, ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    /// Decimal exponent of subdivisions per second (s=0, ms=3, us=6, ns=9).
    pub(crate) fn exponent(self) -> u32 {
        match self {
            TimeUnit::Seconds => 0,
            TimeUnit::Millis => 3,
            TimeUnit::Micros => 6,
            TimeUnit::Nanos => 9,
        }
    }
}

/// The closed set of logical column types understood by the pipeline.
///
/// `Null` marks a column observed with no values at all (e.g. an all-null
/// Parquet column chunk typed as null); it merges into any other type and
/// forces nullability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
    Timestamp(TimeUnit),
    Decimal { precision: u8, scale: i8 },
    List(Box<LogicalType>),
    Struct(Vec<Column>),
}

impl LogicalType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            LogicalType::Int8 | LogicalType::Int16 | LogicalType::Int32 | LogicalType::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LogicalType::Float32 | LogicalType::Float64)
    }

    /// Width in bits for integer and float types.
    fn bit_width(&self) -> Option<u8> {
        match self {
            LogicalType::Int8 => Some(8),
            LogicalType::Int16 => Some(16),
            LogicalType::Int32 => Some(32),
            LogicalType::Int64 => Some(64),
            LogicalType::Float32 => Some(32),
            LogicalType::Float64 => Some(64),
            _ => None,
        }
    }

    /// Decimal digits needed to represent any value of an integer type.
    fn integer_digits(&self) -> Option<u8> {
        match self {
            LogicalType::Int8 => Some(3),
            LogicalType::Int16 => Some(5),
            LogicalType::Int32 => Some(10),
            LogicalType::Int64 => Some(19),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Null => write!(f, "null"),
            LogicalType::Boolean => write!(f, "boolean"),
            LogicalType::Int8 => write!(f, "int8"),
            LogicalType::Int16 => write!(f, "int16"),
            LogicalType::Int32 => write!(f, "int32"),
            LogicalType::Int64 => write!(f, "int64"),
            LogicalType::Float32 => write!(f, "float32"),
            LogicalType::Float64 => write!(f, "float64"),
            LogicalType::Utf8 => write!(f, "utf8"),
            LogicalType::Binary => write!(f, "binary"),
            LogicalType::Timestamp(unit) => {
                let unit = match unit {
                    TimeUnit::Seconds => "s",
                    TimeUnit::Millis => "ms",
                    TimeUnit::Micros => "us",
                    TimeUnit::Nanos => "ns",
                };
                write!(f, "timestamp[{}]", unit)
            }
            LogicalType::Decimal { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            LogicalType::List(inner) => write!(f, "list<{}>", inner),
            LogicalType::Struct(fields) => {
                write!(f, "struct<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// A named, typed column. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: LogicalType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: LogicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("duplicate column name: {0}")]
pub struct DuplicateColumn(pub String);

/// An ordered set of columns. Order is significant only for display;
/// columns match by name, and names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self, DuplicateColumn> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a column by name.
    pub fn find(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }
}

/// How integer/float pairings promote during reconciliation.
///
/// Widening promotions (int width, float width, finer timestamp, wider
/// decimal) are always applied; the policy only decides what happens when an
/// integer meets a float whose declared width cannot represent it exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromotionPolicy {
    /// Promote to a float wide enough for the integer (float64 unless the
    /// integer fits float32 exactly).
    #[default]
    WidenOnly,
    /// Keep the float width as declared, even when the paired integer cannot
    /// be represented exactly.
    KeepDeclaredFloatWidth,
}

impl PromotionPolicy {
    /// Parse from a CLI string (case-insensitive).
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "widen" => Ok(PromotionPolicy::WidenOnly),
            "keep-float-width" => Ok(PromotionPolicy::KeepDeclaredFloatWidth),
            _ => Err(anyhow::anyhow!(
                "unknown promotion policy: {}. Supported: widen, keep-float-width",
                s
            )),
        }
    }
}

/// Merge two same-named column declarations.
///
/// Nullability is the OR of the inputs; a `Null`-typed side forces the result
/// nullable. Pure function; fails with `TypeConflict` for cross-category
/// pairings.
pub fn merge_columns(
    a: &Column,
    b: &Column,
    policy: PromotionPolicy,
) -> Result<Column, TypeConflict> {
    let data_type = merge_types(&a.data_type, &b.data_type, policy).ok_or_else(|| TypeConflict {
        column: a.name.clone(),
        left: a.data_type.clone(),
        right: b.data_type.clone(),
    })?;

    let nullable = a.nullable
        || b.nullable
        || a.data_type == LogicalType::Null
        || b.data_type == LogicalType::Null;

    Ok(Column {
        name: a.name.clone(),
        data_type,
        nullable,
    })
}

/// Type-level merge. Commutative and associative; `None` means the two
/// categories are incompatible.
pub fn merge_types(
    a: &LogicalType,
    b: &LogicalType,
    policy: PromotionPolicy,
) -> Option<LogicalType> {
    use LogicalType::*;

    if a == b {
        return Some(a.clone());
    }

    match (a, b) {
        (Null, t) | (t, Null) => Some(t.clone()),

        // Integer widths widen, never narrow.
        (l, r) if l.is_integer() && r.is_integer() => {
            Some(if l.bit_width() >= r.bit_width() {
                l.clone()
            } else {
                r.clone()
            })
        }

        // Float widths widen.
        (l, r) if l.is_float() && r.is_float() => Some(if l.bit_width() >= r.bit_width() {
            l.clone()
        } else {
            r.clone()
        }),

        // Integer + float promotes to a float; the policy decides the width.
        (l, r) if (l.is_integer() && r.is_float()) || (l.is_float() && r.is_integer()) => {
            let (int, float) = if l.is_integer() { (l, r) } else { (r, l) };
            Some(merge_int_float(int, float, policy))
        }

        // Timestamps widen to the finer precision (exact multiplication).
        (Timestamp(l), Timestamp(r)) => Some(Timestamp((*l).max(*r))),

        // Decimals widen scale and integer digits together.
        (
            Decimal {
                precision: p1,
                scale: s1,
            },
            Decimal {
                precision: p2,
                scale: s2,
            },
        ) => merge_decimals(*p1, *s1, *p2, *s2),

        // Integer + decimal widens the decimal to hold the integer range.
        (int, Decimal { precision, scale }) | (Decimal { precision, scale }, int)
            if int.is_integer() =>
        {
            let digits = int.integer_digits()?;
            let int_digits = (*precision as i16 - *scale as i16).max(digits as i16);
            let precision = int_digits + *scale as i16;
            if precision > 38 {
                return None;
            }
            Some(Decimal {
                precision: precision as u8,
                scale: *scale,
            })
        }

        // Decimal + float promotes to float64.
        (Decimal { .. }, f) | (f, Decimal { .. }) if f.is_float() => Some(Float64),

        (List(l), List(r)) => Some(List(Box::new(merge_types(l, r, policy)?))),

        (Struct(l), Struct(r)) => merge_structs(l, r, policy).map(Struct),

        _ => None,
    }
}

fn merge_int_float(int: &LogicalType, float: &LogicalType, policy: PromotionPolicy) -> LogicalType {
    match policy {
        PromotionPolicy::KeepDeclaredFloatWidth => float.clone(),
        PromotionPolicy::WidenOnly => {
            // float32 holds int8/int16 exactly; anything wider needs float64.
            if *float == LogicalType::Float32 && int.bit_width().unwrap_or(64) <= 16 {
                LogicalType::Float32
            } else {
                LogicalType::Float64
            }
        }
    }
}

fn merge_decimals(p1: u8, s1: i8, p2: u8, s2: i8) -> Option<LogicalType> {
    let scale = s1.max(s2);
    let int_digits = (p1 as i16 - s1 as i16).max(p2 as i16 - s2 as i16);
    let precision = int_digits + scale as i16;
    if precision > 38 {
        return None;
    }
    Some(LogicalType::Decimal {
        precision: precision as u8,
        scale,
    })
}

/// Field-wise union of two struct types. Fields present on only one side
/// become nullable; same-named fields merge recursively.
fn merge_structs(
    left: &[Column],
    right: &[Column],
    policy: PromotionPolicy,
) -> Option<Vec<Column>> {
    let mut merged: Vec<Column> = Vec::with_capacity(left.len().max(right.len()));

    for l in left {
        match right.iter().find(|r| r.name == l.name) {
            Some(r) => merged.push(merge_columns(l, r, policy).ok()?),
            None => merged.push(Column {
                nullable: true,
                ..l.clone()
            }),
        }
    }
    for r in right {
        if !left.iter().any(|l| l.name == r.name) {
            merged.push(Column {
                nullable: true,
                ..r.clone()
            });
        }
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: LogicalType, nullable: bool) -> Column {
        Column::new(name, ty, nullable)
    }

    #[test]
    fn test_identical_types_merge_unchanged() {
        let a = col("x", LogicalType::Int32, false);
        let b = col("x", LogicalType::Int32, false);
        let merged = merge_columns(&a, &b, PromotionPolicy::default()).unwrap();
        assert_eq!(merged.data_type, LogicalType::Int32);
        assert!(!merged.nullable);
    }

    #[test]
    fn test_integer_widening() {
        let merged = merge_types(
            &LogicalType::Int32,
            &LogicalType::Int64,
            PromotionPolicy::default(),
        )
        .unwrap();
        assert_eq!(merged, LogicalType::Int64);

        let merged = merge_types(
            &LogicalType::Int8,
            &LogicalType::Int16,
            PromotionPolicy::default(),
        )
        .unwrap();
        assert_eq!(merged, LogicalType::Int16);
    }

    #[test]
    fn test_int_float_promotion_widens_by_default() {
        // int32 cannot be held exactly by float32, so WidenOnly picks float64.
        let merged = merge_types(
            &LogicalType::Int32,
            &LogicalType::Float32,
            PromotionPolicy::WidenOnly,
        )
        .unwrap();
        assert_eq!(merged, LogicalType::Float64);

        // int16 fits float32 exactly.
        let merged = merge_types(
            &LogicalType::Int16,
            &LogicalType::Float32,
            PromotionPolicy::WidenOnly,
        )
        .unwrap();
        assert_eq!(merged, LogicalType::Float32);
    }

    #[test]
    fn test_int_float_promotion_keeps_declared_width_under_policy() {
        let merged = merge_types(
            &LogicalType::Int64,
            &LogicalType::Float32,
            PromotionPolicy::KeepDeclaredFloatWidth,
        )
        .unwrap();
        assert_eq!(merged, LogicalType::Float32);
    }

    #[test]
    fn test_null_observation_forces_nullable() {
        let a = col("x", LogicalType::Utf8, false);
        let b = col("x", LogicalType::Null, false);
        let merged = merge_columns(&a, &b, PromotionPolicy::default()).unwrap();
        assert_eq!(merged.data_type, LogicalType::Utf8);
        assert!(merged.nullable);
    }

    #[test]
    fn test_nullability_is_or_of_inputs() {
        let a = col("x", LogicalType::Int32, true);
        let b = col("x", LogicalType::Int32, false);
        let merged = merge_columns(&a, &b, PromotionPolicy::default()).unwrap();
        assert!(merged.nullable);
    }

    #[test]
    fn test_cross_category_conflict() {
        let a = col("x", LogicalType::Utf8, false);
        let b = col(
            "x",
            LogicalType::Struct(vec![col("y", LogicalType::Int32, false)]),
            false,
        );
        let err = merge_columns(&a, &b, PromotionPolicy::default()).unwrap_err();
        assert_eq!(err.column, "x");
        assert_eq!(err.left, LogicalType::Utf8);
    }

    #[test]
    fn test_boolean_does_not_promote_to_integer() {
        assert!(
            merge_types(
                &LogicalType::Boolean,
                &LogicalType::Int32,
                PromotionPolicy::default()
            )
            .is_none()
        );
    }

    #[test]
    fn test_timestamp_widens_to_finer_unit() {
        let merged = merge_types(
            &LogicalType::Timestamp(TimeUnit::Seconds),
            &LogicalType::Timestamp(TimeUnit::Micros),
            PromotionPolicy::default(),
        )
        .unwrap();
        assert_eq!(merged, LogicalType::Timestamp(TimeUnit::Micros));
    }

    #[test]
    fn test_decimal_merge_widens_scale_and_digits() {
        let merged = merge_types(
            &LogicalType::Decimal {
                precision: 10,
                scale: 2,
            },
            &LogicalType::Decimal {
                precision: 8,
                scale: 4,
            },
            PromotionPolicy::default(),
        )
        .unwrap();
        // 8 integer digits + 4 fractional digits.
        assert_eq!(
            merged,
            LogicalType::Decimal {
                precision: 12,
                scale: 4,
            }
        );
    }

    #[test]
    fn test_decimal_overflow_is_conflict() {
        assert!(
            merge_types(
                &LogicalType::Decimal {
                    precision: 38,
                    scale: 0,
                },
                &LogicalType::Decimal {
                    precision: 38,
                    scale: 20,
                },
                PromotionPolicy::default(),
            )
            .is_none()
        );
    }

    #[test]
    fn test_int_decimal_merge_holds_integer_range() {
        let merged = merge_types(
            &LogicalType::Int64,
            &LogicalType::Decimal {
                precision: 10,
                scale: 2,
            },
            PromotionPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            merged,
            LogicalType::Decimal {
                precision: 21,
                scale: 2,
            }
        );
    }

    #[test]
    fn test_list_merges_recursively() {
        let merged = merge_types(
            &LogicalType::List(Box::new(LogicalType::Int32)),
            &LogicalType::List(Box::new(LogicalType::Int64)),
            PromotionPolicy::default(),
        )
        .unwrap();
        assert_eq!(merged, LogicalType::List(Box::new(LogicalType::Int64)));
    }

    #[test]
    fn test_struct_merge_unions_fields() {
        let a = LogicalType::Struct(vec![
            col("a", LogicalType::Int32, false),
            col("b", LogicalType::Utf8, false),
        ]);
        let b = LogicalType::Struct(vec![
            col("a", LogicalType::Int64, false),
            col("c", LogicalType::Boolean, false),
        ]);
        let merged = merge_types(&a, &b, PromotionPolicy::default()).unwrap();
        match merged {
            LogicalType::Struct(fields) => {
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[0].data_type, LogicalType::Int64);
                // Fields on one side only become nullable.
                assert!(fields[1].nullable);
                assert!(fields[2].nullable);
            }
            other => panic!("expected struct, got {}", other),
        }
    }

    #[test]
    fn test_merge_is_commutative() {
        let types = [
            LogicalType::Null,
            LogicalType::Boolean,
            LogicalType::Int8,
            LogicalType::Int32,
            LogicalType::Int64,
            LogicalType::Float32,
            LogicalType::Float64,
            LogicalType::Utf8,
            LogicalType::Binary,
            LogicalType::Timestamp(TimeUnit::Millis),
            LogicalType::Decimal {
                precision: 12,
                scale: 3,
            },
            LogicalType::List(Box::new(LogicalType::Utf8)),
        ];
        for a in &types {
            for b in &types {
                assert_eq!(
                    merge_types(a, b, PromotionPolicy::default()),
                    merge_types(b, a, PromotionPolicy::default()),
                    "merge not commutative for {} / {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_merge_is_associative() {
        let triples = [
            (LogicalType::Int8, LogicalType::Int32, LogicalType::Int64),
            (
                LogicalType::Int16,
                LogicalType::Float32,
                LogicalType::Float64,
            ),
            (
                LogicalType::Null,
                LogicalType::Int32,
                LogicalType::Float64,
            ),
            (
                LogicalType::Timestamp(TimeUnit::Seconds),
                LogicalType::Timestamp(TimeUnit::Millis),
                LogicalType::Timestamp(TimeUnit::Nanos),
            ),
        ];
        let policy = PromotionPolicy::default();
        for (a, b, c) in &triples {
            let left = merge_types(&merge_types(a, b, policy).unwrap(), c, policy);
            let right = merge_types(a, &merge_types(b, c, policy).unwrap(), policy);
            assert_eq!(left, right, "merge not associative for {} {} {}", a, b, c);
        }
    }

    #[test]
    fn test_schema_rejects_duplicate_names() {
        let result = Schema::new(vec![
            col("x", LogicalType::Int32, false),
            col("x", LogicalType::Int64, false),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_find_matches_by_name() {
        let schema = Schema::new(vec![
            col("a", LogicalType::Int32, false),
            col("b", LogicalType::Utf8, true),
        ])
        .unwrap();
        let (idx, column) = schema.find("b").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(column.data_type, LogicalType::Utf8);
        assert!(schema.find("missing").is_none());
    }
}
