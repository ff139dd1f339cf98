use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::schema::{ColumnKind, ColumnSpec, Schema};

pub use crate::types::{CategoryValue, ColumnName};

/// A single cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Continuous feature or target value.
    Number(f64),
    /// Raw categorical value.
    Category(CategoryValue),
    /// One-hot indicator.
    Flag(bool),
}

impl Value {
    /// Numeric view of the cell; indicators map to `0.0`/`1.0`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Flag(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            Value::Category(_) => None,
        }
    }

    fn fits(&self, kind: ColumnKind) -> bool {
        match (self, kind) {
            (Value::Number(_), ColumnKind::Continuous | ColumnKind::Target) => true,
            (Value::Category(_), ColumnKind::Categorical) => true,
            (Value::Flag(_), ColumnKind::Indicator) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Category(value) => f.write_str(value),
            Value::Flag(flag) => f.write_str(if *flag { "1" } else { "0" }),
        }
    }
}

/// One row, positionally aligned with the table schema.
pub type Row = Vec<Value>;

/// Row-major in-memory table whose cells always match its schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table, checking every row's width and cell kinds.
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self, PipelineError> {
        for (row_idx, row) in rows.iter().enumerate() {
            check_row(&schema, row_idx, row)?;
        }
        Ok(Self { schema, rows })
    }

    /// Empty table with `schema`.
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Column schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.schema.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the table into its parts.
    pub fn into_parts(self) -> (Schema, Vec<Row>) {
        (self.schema, self.rows)
    }

    /// Numeric values of `name`, in row order.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, PipelineError> {
        let idx = self.schema.position(name)?;
        self.rows
            .iter()
            .map(|row| {
                row[idx].as_f64().ok_or_else(|| {
                    PipelineError::Data(format!("column '{name}' is not numeric"))
                })
            })
            .collect()
    }

    /// Target values in row order; errors when the table has no target.
    pub fn target_values(&self) -> Result<Vec<f64>, PipelineError> {
        let idx = self.schema.require_target()?;
        self.rows
            .iter()
            .map(|row| {
                row[idx]
                    .as_f64()
                    .ok_or_else(|| PipelineError::Data("target cell is not numeric".into()))
            })
            .collect()
    }

    /// New table containing the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Result<Table, PipelineError> {
        let mut rows = Vec::with_capacity(indices.len());
        for &idx in indices {
            let row = self.rows.get(idx).ok_or_else(|| {
                PipelineError::Data(format!(
                    "row index {idx} out of bounds for table of {} rows",
                    self.height()
                ))
            })?;
            rows.push(row.clone());
        }
        Ok(Table {
            schema: self.schema.clone(),
            rows,
        })
    }

    /// New table without the target column.
    pub fn without_target(&self) -> Result<Table, PipelineError> {
        let idx = self.schema.require_target()?;
        let order: Vec<usize> = (0..self.width()).filter(|col| *col != idx).collect();
        self.project(&order)
    }

    /// New table with the target moved to the first column; others keep their order.
    pub fn target_first(&self) -> Result<Table, PipelineError> {
        let idx = self.schema.require_target()?;
        let order: Vec<usize> = std::iter::once(idx)
            .chain((0..self.width()).filter(|col| *col != idx))
            .collect();
        self.project(&order)
    }

    /// New table made of the columns at `order`.
    pub fn project(&self, order: &[usize]) -> Result<Table, PipelineError> {
        let mut specs = Vec::with_capacity(order.len());
        for &col in order {
            let (Some(name), Some(kind)) = (self.schema.name_at(col), self.schema.kind_at(col))
            else {
                return Err(PipelineError::Schema(format!(
                    "column index {col} out of bounds for {} columns",
                    self.width()
                )));
            };
            specs.push(ColumnSpec {
                name: name.to_string(),
                kind,
            });
        }
        let schema = Schema::new(specs)?;
        let rows = self
            .rows
            .iter()
            .map(|row| order.iter().map(|&col| row[col].clone()).collect())
            .collect();
        Ok(Table { schema, rows })
    }
}

fn check_row(schema: &Schema, row_idx: usize, row: &Row) -> Result<(), PipelineError> {
    if row.len() != schema.len() {
        return Err(PipelineError::Schema(format!(
            "row {row_idx} has {} cells, schema expects {}",
            row.len(),
            schema.len()
        )));
    }
    for (col, value) in row.iter().enumerate() {
        let kind = schema.kind_at(col).unwrap_or(ColumnKind::Continuous);
        if !value.fits(kind) {
            return Err(PipelineError::Schema(format!(
                "row {row_idx} column '{}' holds {value:?}, expected {kind:?}",
                schema.name_at(col).unwrap_or("?")
            )));
        }
    }
    Ok(())
}
