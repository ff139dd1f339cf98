//! Data loader: headed CSV from object storage into a schema-checked `Table`.

use tracing::info;

use crate::data::{Row, Table, Value};
use crate::errors::PipelineError;
use crate::schema::{ColumnKind, Schema};
use crate::transport::{ObjectStore, ObjectUri};

/// Read the CSV at `uri` and validate it against `schema`.
///
/// The header must list exactly the schema's columns in order. Numeric cells
/// must parse as finite numbers and target values must be non-negative.
pub fn load_table(
    store: &dyn ObjectStore,
    uri: &ObjectUri,
    schema: &Schema,
) -> Result<Table, PipelineError> {
    let text = store.get_string(uri)?;
    let table = parse_table(&text, schema)?;
    info!(
        "[ltv:loader] loaded {} rows x {} columns from {}",
        table.height(),
        table.width(),
        uri
    );
    Ok(table)
}

/// Parse headed CSV text against `schema`.
pub fn parse_table(text: &str, schema: &Schema) -> Result<Table, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    schema.check_header(&header)?;

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let mut row: Row = Vec::with_capacity(schema.len());
        for (col, raw) in record.iter().enumerate() {
            let (Some(name), Some(kind)) = (schema.name_at(col), schema.kind_at(col)) else {
                return Err(PipelineError::Schema(format!(
                    "row {row_idx} has more than {} cells",
                    schema.len()
                )));
            };
            row.push(parse_cell(raw, kind).map_err(|reason| {
                PipelineError::Schema(format!("row {row_idx} column '{name}': {reason}"))
            })?);
        }
        rows.push(row);
    }
    Table::new(schema.clone(), rows)
}

fn parse_cell(raw: &str, kind: ColumnKind) -> Result<Value, String> {
    match kind {
        ColumnKind::Categorical => {
            if raw.is_empty() {
                Err("empty category".to_string())
            } else {
                Ok(Value::Category(raw.to_string()))
            }
        }
        ColumnKind::Continuous | ColumnKind::Target => {
            let value = raw
                .parse::<f64>()
                .map_err(|_| format!("'{raw}' is not a number"))?;
            if !value.is_finite() {
                return Err(format!("'{raw}' is not finite"));
            }
            if kind == ColumnKind::Target && value < 0.0 {
                return Err(format!("target value {value} is negative"));
            }
            Ok(Value::Number(value))
        }
        ColumnKind::Indicator => match raw {
            "1" | "true" | "True" => Ok(Value::Flag(true)),
            "0" | "false" | "False" => Ok(Value::Flag(false)),
            _ => Err(format!("'{raw}' is not an indicator value")),
        },
    }
}
