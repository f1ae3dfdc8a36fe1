//! Derives one target schema from the native schemas of all input files.

use serde::Serialize;

use crate::error::ReconcileError;
use crate::schema::{Column, LogicalType, PromotionPolicy, Schema, merge_columns};

/// A reconciled column plus its provenance across the input files.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledColumn {
    #[serde(flatten)]
    pub column: Column,
    /// Files that declared this column, in arrival order.
    pub sources: Vec<String>,
    /// True when the reconciled type differs from at least one declaration.
    pub promoted: bool,
}

/// The merged target schema for a run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledSchema {
    columns: Vec<ReconciledColumn>,
}

impl ReconciledSchema {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ReconciledColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&ReconciledColumn> {
        self.columns.iter().find(|c| c.column.name == name)
    }

    /// The target schema without provenance bookkeeping.
    pub fn schema(&self) -> Schema {
        // Reconciled columns inherit uniqueness from the accumulator fold.
        Schema::new(self.columns.iter().map(|c| c.column.clone()).collect())
            .unwrap_or_else(|_| Schema::empty())
    }
}

/// Accumulator entry during the fold; declared types are kept so promotion
/// can be decided once all files have contributed.
struct Accumulated {
    column: Column,
    sources: Vec<String>,
    declared: Vec<LogicalType>,
}

/// Fold the input schemas, in file order, into a single reconciled schema.
///
/// Columns absent from the accumulator are inserted as declared; columns
/// already present merge under the schema model rules. The merged result is
/// independent of input order (column merge is commutative and associative);
/// only provenance ordering follows arrival order. Fails fast on the first
/// type conflict; missing columns never fail and instead become nullable.
pub fn reconcile(
    inputs: &[(String, Schema)],
    policy: PromotionPolicy,
) -> Result<ReconciledSchema, ReconcileError> {
    let mut accumulator: Vec<Accumulated> = Vec::new();

    for (file_id, schema) in inputs {
        for column in schema.columns() {
            match accumulator
                .iter_mut()
                .find(|acc| acc.column.name == column.name)
            {
                None => accumulator.push(Accumulated {
                    column: column.clone(),
                    sources: vec![file_id.clone()],
                    declared: vec![column.data_type.clone()],
                }),
                Some(acc) => {
                    let merged = merge_columns(&acc.column, column, policy).map_err(|conflict| {
                        ReconcileError {
                            column: conflict.column,
                            left: conflict.left,
                            left_file: acc.sources.first().cloned().unwrap_or_default(),
                            right: conflict.right,
                            right_file: file_id.clone(),
                        }
                    })?;
                    acc.column = merged;
                    acc.sources.push(file_id.clone());
                    acc.declared.push(column.data_type.clone());
                }
            }
        }
    }

    let file_count = inputs.len();
    let columns = accumulator
        .into_iter()
        .map(|acc| {
            let missing_somewhere = acc.sources.len() < file_count;
            let promoted = acc
                .declared
                .iter()
                .any(|ty| *ty != acc.column.data_type && *ty != LogicalType::Null);
            ReconciledColumn {
                column: Column {
                    // A file that never declares the column contributes no
                    // value for it, so the column must accept nulls.
                    nullable: acc.column.nullable || missing_somewhere,
                    ..acc.column
                },
                sources: acc.sources,
                promoted,
            }
        })
        .collect();

    Ok(ReconciledSchema { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TimeUnit;

    fn col(name: &str, ty: LogicalType, nullable: bool) -> Column {
        Column::new(name, ty, nullable)
    }

    fn schema(columns: Vec<Column>) -> Schema {
        Schema::new(columns).unwrap()
    }

    #[test]
    fn test_reconcile_example_widens_and_null_fills() {
        // File A: (id: int32, name: utf8); file B adds age and widens id.
        let inputs = vec![
            (
                "a.parquet".to_string(),
                schema(vec![
                    col("id", LogicalType::Int32, false),
                    col("name", LogicalType::Utf8, false),
                ]),
            ),
            (
                "b.parquet".to_string(),
                schema(vec![
                    col("id", LogicalType::Int64, false),
                    col("name", LogicalType::Utf8, false),
                    col("age", LogicalType::Int32, false),
                ]),
            ),
        ];

        let reconciled = reconcile(&inputs, PromotionPolicy::default()).unwrap();
        assert_eq!(reconciled.len(), 3);

        let id = reconciled.find("id").unwrap();
        assert_eq!(id.column.data_type, LogicalType::Int64);
        assert!(id.promoted);
        assert!(!id.column.nullable);
        assert_eq!(id.sources, vec!["a.parquet", "b.parquet"]);

        let name = reconciled.find("name").unwrap();
        assert!(!name.promoted);
        assert!(!name.column.nullable);

        // age is missing from file A, so it must accept nulls.
        let age = reconciled.find("age").unwrap();
        assert_eq!(age.column.data_type, LogicalType::Int32);
        assert!(age.column.nullable);
        assert_eq!(age.sources, vec!["b.parquet"]);
    }

    #[test]
    fn test_reconcile_result_is_order_independent() {
        let a = (
            "a".to_string(),
            schema(vec![
                col("x", LogicalType::Int16, false),
                col("y", LogicalType::Timestamp(TimeUnit::Seconds), true),
            ]),
        );
        let b = (
            "b".to_string(),
            schema(vec![
                col("y", LogicalType::Timestamp(TimeUnit::Nanos), false),
                col("x", LogicalType::Int64, false),
                col("z", LogicalType::Utf8, false),
            ]),
        );

        let forward = reconcile(&[a.clone(), b.clone()], PromotionPolicy::default()).unwrap();
        let backward = reconcile(&[b, a], PromotionPolicy::default()).unwrap();

        // Column order may differ (insertion order), but per-name results
        // must agree exactly.
        assert_eq!(forward.len(), backward.len());
        for column in forward.columns() {
            let other = backward.find(&column.column.name).unwrap();
            assert_eq!(column.column, other.column);
        }
    }

    #[test]
    fn test_reconcile_conflict_fails_fast_with_context() {
        let inputs = vec![
            (
                "left.parquet".to_string(),
                schema(vec![col("x", LogicalType::Utf8, false)]),
            ),
            (
                "right.parquet".to_string(),
                schema(vec![col(
                    "x",
                    LogicalType::Struct(vec![col("y", LogicalType::Int32, false)]),
                    false,
                )]),
            ),
        ];

        let err = reconcile(&inputs, PromotionPolicy::default()).unwrap_err();
        assert_eq!(err.column, "x");
        assert_eq!(err.left_file, "left.parquet");
        assert_eq!(err.right_file, "right.parquet");
    }

    #[test]
    fn test_reconcile_empty_input() {
        let reconciled = reconcile(&[], PromotionPolicy::default()).unwrap();
        assert!(reconciled.is_empty());
    }

    #[test]
    fn test_single_file_reconciles_verbatim() {
        let inputs = vec![(
            "only.parquet".to_string(),
            schema(vec![
                col("a", LogicalType::Int32, false),
                col("b", LogicalType::Utf8, true),
            ]),
        )];
        let reconciled = reconcile(&inputs, PromotionPolicy::default()).unwrap();
        assert_eq!(reconciled.schema(), inputs[0].1);
        assert!(reconciled.columns().iter().all(|c| !c.promoted));
    }

    #[test]
    fn test_all_null_column_takes_type_from_other_file() {
        let inputs = vec![
            (
                "a".to_string(),
                schema(vec![col("v", LogicalType::Null, true)]),
            ),
            (
                "b".to_string(),
                schema(vec![col("v", LogicalType::Float64, false)]),
            ),
        ];
        let reconciled = reconcile(&inputs, PromotionPolicy::default()).unwrap();
        let v = reconciled.find("v").unwrap();
        assert_eq!(v.column.data_type, LogicalType::Float64);
        assert!(v.column.nullable);
        // Adopting a type over a null observation is not a promotion.
        assert!(!v.promoted);
    }
}
