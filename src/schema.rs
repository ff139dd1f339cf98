//! Explicit, ordered column schema checked when a table is loaded.
//!
//! Every table carries a `Schema`. Column lookups go through it, so a typo in
//! a column name fails fast instead of silently selecting nothing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::types::ColumnName;

/// Type of a column and the role it plays in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Free-text category expanded by the one-hot encoder.
    Categorical,
    /// Real-valued feature passed through untouched.
    Continuous,
    /// Boolean indicator produced by one-hot encoding.
    Indicator,
    /// Real-valued regression target (lifetime revenue).
    Target,
}

impl ColumnKind {
    /// True for kinds stored as `Value::Number`.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Continuous | ColumnKind::Target)
    }
}

/// One named, typed column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Header name.
    pub name: ColumnName,
    /// Column type.
    pub kind: ColumnKind,
}

impl ColumnSpec {
    /// Categorical column.
    pub fn categorical(name: impl Into<ColumnName>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
        }
    }

    /// Continuous column.
    pub fn continuous(name: impl Into<ColumnName>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Continuous,
        }
    }

    /// Indicator column.
    pub fn indicator(name: impl Into<ColumnName>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Indicator,
        }
    }

    /// Target column.
    pub fn target(name: impl Into<ColumnName>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Target,
        }
    }
}

/// Ordered set of uniquely named columns with at most one target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnSpec>", into = "Vec<ColumnSpec>")]
pub struct Schema {
    columns: IndexMap<ColumnName, ColumnKind>,
}

impl Schema {
    /// Build a schema, rejecting duplicate names and multiple targets.
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, PipelineError> {
        let mut map = IndexMap::with_capacity(columns.len());
        let mut targets = 0usize;
        for spec in columns {
            if spec.name.trim().is_empty() {
                return Err(PipelineError::Schema("column names must be non-empty".into()));
            }
            if spec.kind == ColumnKind::Target {
                targets += 1;
            }
            if map.insert(spec.name.clone(), spec.kind).is_some() {
                return Err(PipelineError::Schema(format!(
                    "duplicate column '{}'",
                    spec.name
                )));
            }
        }
        if targets > 1 {
            return Err(PipelineError::Schema(format!(
                "expected at most one target column, found {targets}"
            )));
        }
        Ok(Self { columns: map })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Column specs in order.
    pub fn columns(&self) -> impl Iterator<Item = ColumnSpec> + '_ {
        self.columns.iter().map(|(name, kind)| ColumnSpec {
            name: name.clone(),
            kind: *kind,
        })
    }

    /// Kind of the column at `idx`.
    pub fn kind_at(&self, idx: usize) -> Option<ColumnKind> {
        self.columns.get_index(idx).map(|(_, kind)| *kind)
    }

    /// Name of the column at `idx`.
    pub fn name_at(&self, idx: usize) -> Option<&str> {
        self.columns.get_index(idx).map(|(name, _)| name.as_str())
    }

    /// Position of `name`, or a schema error naming the missing column.
    pub fn position(&self, name: &str) -> Result<usize, PipelineError> {
        self.columns
            .get_index_of(name)
            .ok_or_else(|| PipelineError::Schema(format!("unknown column '{name}'")))
    }

    /// Kind of `name`.
    pub fn kind_of(&self, name: &str) -> Result<ColumnKind, PipelineError> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::Schema(format!("unknown column '{name}'")))
    }

    /// Position of the target column, if any.
    pub fn target_index(&self) -> Option<usize> {
        self.columns
            .values()
            .position(|kind| *kind == ColumnKind::Target)
    }

    /// Position of the target column, or a data error when it is absent.
    pub fn require_target(&self) -> Result<usize, PipelineError> {
        self.target_index()
            .ok_or_else(|| PipelineError::Data("table has no target column".into()))
    }

    /// Verify that a CSV header lists exactly this schema's columns in order.
    pub fn check_header<S: AsRef<str>>(&self, header: &[S]) -> Result<(), PipelineError> {
        if header.len() != self.len() {
            return Err(PipelineError::Schema(format!(
                "header has {} columns, schema expects {}",
                header.len(),
                self.len()
            )));
        }
        for (idx, (found, expected)) in header.iter().zip(self.names()).enumerate() {
            if found.as_ref().trim() != expected {
                return Err(PipelineError::Schema(format!(
                    "header column {idx} is '{}', schema expects '{expected}'",
                    found.as_ref().trim()
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<ColumnSpec>> for Schema {
    type Error = PipelineError;

    fn try_from(columns: Vec<ColumnSpec>) -> Result<Self, Self::Error> {
        Schema::new(columns)
    }
}

impl From<Schema> for Vec<ColumnSpec> {
    fn from(schema: Schema) -> Self {
        schema.columns().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(vec![
            ColumnSpec::categorical("gender"),
            ColumnSpec::continuous("monthly_fee"),
            ColumnSpec::target("lifetime_revenue"),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = Schema::new(vec![
            ColumnSpec::continuous("a"),
            ColumnSpec::continuous("a"),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_multiple_targets() {
        let err = Schema::new(vec![ColumnSpec::target("a"), ColumnSpec::target("b")]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn header_check_reports_first_mismatch() {
        let schema = sample();
        schema
            .check_header(&["gender", "monthly_fee", "lifetime_revenue"])
            .unwrap();
        let err = schema
            .check_header(&["gender", "fee", "lifetime_revenue"])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref msg) if msg.contains("'fee'")));
        let err = schema.check_header(&["gender"]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref msg) if msg.contains("1 columns")));
    }

    #[test]
    fn lookups_follow_declared_order() {
        let schema = sample();
        assert_eq!(schema.position("monthly_fee").unwrap(), 1);
        assert_eq!(schema.target_index(), Some(2));
        assert!(schema.position("missing").is_err());
    }

    #[test]
    fn serde_round_trip_revalidates() {
        let raw = r#"[{"name":"x","kind":"continuous"},{"name":"x","kind":"target"}]"#;
        assert!(serde_json::from_str::<Schema>(raw).is_err());
    }
}
