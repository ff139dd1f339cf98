//! One-hot feature encoding.
//!
//! Each listed categorical column is replaced in place by one indicator column
//! per observed value, named `<column>_<value>` and ordered by value. Every
//! other column, the target included, passes through unchanged.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::constants::encoding::INDICATOR_SEPARATOR;
use crate::data::{Row, Table, Value};
use crate::errors::PipelineError;
use crate::schema::{ColumnKind, ColumnSpec, Schema};
use crate::types::{CategoryValue, ColumnName};

/// Indicator columns generated for one source column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndicatorGroup {
    /// Source categorical column.
    pub column: ColumnName,
    /// Observed values, sorted; one indicator per value in this order.
    pub values: Vec<CategoryValue>,
}

impl IndicatorGroup {
    /// Generated indicator column names, in order.
    pub fn indicator_names(&self) -> Vec<ColumnName> {
        self.values
            .iter()
            .map(|value| indicator_name(&self.column, value))
            .collect()
    }
}

/// Result of encoding: the expanded table and the groups that produced it.
#[derive(Clone, Debug)]
pub struct EncodedTable {
    /// Table with indicator columns in place of the encoded categoricals.
    pub table: Table,
    /// One group per encoded column, in the order they were requested.
    pub groups: Vec<IndicatorGroup>,
}

/// Name of the indicator for `value` in `column`.
pub fn indicator_name(column: &str, value: &str) -> ColumnName {
    format!("{column}{INDICATOR_SEPARATOR}{value}")
}

/// One-hot encode `columns` of `table`.
///
/// Each name must refer to a `Categorical` column. Encoding is deterministic:
/// the same input always yields the same columns in the same order.
pub fn one_hot_encode(table: &Table, columns: &[&str]) -> Result<EncodedTable, PipelineError> {
    let schema = table.schema();
    let mut encoded_at: HashMap<usize, usize> = HashMap::new();
    let mut groups = Vec::with_capacity(columns.len());
    for name in columns {
        let idx = schema.position(name)?;
        if schema.kind_of(name)? != ColumnKind::Categorical {
            return Err(PipelineError::Schema(format!(
                "column '{name}' is not categorical and cannot be one-hot encoded"
            )));
        }
        if encoded_at.contains_key(&idx) {
            return Err(PipelineError::Configuration(format!(
                "column '{name}' listed twice for encoding"
            )));
        }
        let observed: BTreeSet<&str> = table
            .rows()
            .iter()
            .filter_map(|row| match &row[idx] {
                Value::Category(value) => Some(value.as_str()),
                _ => None,
            })
            .collect();
        encoded_at.insert(idx, groups.len());
        groups.push(IndicatorGroup {
            column: (*name).to_string(),
            values: observed.into_iter().map(str::to_string).collect(),
        });
    }

    let mut specs = Vec::new();
    for (col, spec) in schema.columns().enumerate() {
        match encoded_at.get(&col) {
            Some(&group_idx) => specs.extend(
                groups[group_idx]
                    .indicator_names()
                    .into_iter()
                    .map(ColumnSpec::indicator),
            ),
            None => specs.push(spec),
        }
    }
    let encoded_schema = Schema::new(specs)?;

    let mut rows: Vec<Row> = Vec::with_capacity(table.height());
    for row in table.rows() {
        let mut out = Vec::with_capacity(encoded_schema.len());
        for (col, value) in row.iter().enumerate() {
            match (encoded_at.get(&col), value) {
                (Some(&group_idx), Value::Category(observed)) => out.extend(
                    groups[group_idx]
                        .values
                        .iter()
                        .map(|candidate| Value::Flag(candidate == observed)),
                ),
                (Some(_), other) => {
                    return Err(PipelineError::Data(format!(
                        "expected a category in column {col}, found {other:?}"
                    )));
                }
                (None, _) => out.push(value.clone()),
            }
        }
        rows.push(out);
    }

    for group in &groups {
        info!(
            "[ltv:encode] column '{}' expanded into {} indicators",
            group.column,
            group.values.len()
        );
    }
    let table = Table::new(encoded_schema, rows)?;
    Ok(EncodedTable { table, groups })
}
