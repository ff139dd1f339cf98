//! Dataset writer: split CSVs for training and inference, plus prediction exports.
//!
//! Train and validation files are headerless with the target first. The test
//! file is headerless with the target dropped, so inference input never carries
//! ground truth. Every upload replaces whatever was at the destination.

use tracing::info;

use crate::constants::artifacts::{
    PREDICTIONS_COLUMN, PREDICTIONS_SUFFIX, TEST_FILE, TRAIN_FILE, VALIDATION_FILE,
};
use crate::data::{Row, Table};
use crate::errors::PipelineError;
use crate::schema::ColumnKind;
use crate::splits::{SplitLabel, SplitTables};
use crate::transport::{ObjectStore, ObjectUri};
use crate::types::CsvPayload;

/// Where each split was uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitLocations {
    /// Train CSV.
    pub train: ObjectUri,
    /// Validation CSV.
    pub validation: ObjectUri,
    /// Test CSV (no target column).
    pub test: ObjectUri,
}

impl SplitLocations {
    /// Canonical locations under `root`: `<root>/<split>/<split>.csv`.
    pub fn under(root: &ObjectUri) -> Self {
        Self {
            train: root.join(SplitLabel::Train.as_str()).join(TRAIN_FILE),
            validation: root
                .join(SplitLabel::Validation.as_str())
                .join(VALIDATION_FILE),
            test: root.join(SplitLabel::Test.as_str()).join(TEST_FILE),
        }
    }

    /// Location for `label`.
    pub fn get(&self, label: SplitLabel) -> &ObjectUri {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }
}

/// Headerless CSV rows, cells rendered in column order.
pub fn rows_to_csv(rows: &[Row]) -> Result<CsvPayload, PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    finish(writer)
}

/// Headerless CSV for `label`: target first for train/validation, target dropped for test.
///
/// Fails if any categorical column is still unencoded.
pub fn split_csv(table: &Table, label: SplitLabel) -> Result<CsvPayload, PipelineError> {
    if let Some(name) = table
        .schema()
        .columns()
        .find(|spec| spec.kind == ColumnKind::Categorical)
        .map(|spec| spec.name)
    {
        return Err(PipelineError::Data(format!(
            "column '{name}' must be one-hot encoded before writing {label} data"
        )));
    }
    let arranged = match label {
        SplitLabel::Train | SplitLabel::Validation => table.target_first()?,
        SplitLabel::Test => table.without_target()?,
    };
    rows_to_csv(arranged.rows())
}

/// Serialize and upload all three splits under `root`.
pub fn write_splits(
    store: &dyn ObjectStore,
    root: &ObjectUri,
    tables: &SplitTables,
) -> Result<SplitLocations, PipelineError> {
    let locations = SplitLocations::under(root);
    for (label, table) in tables.iter() {
        let payload = split_csv(table, label)?;
        let uri = locations.get(label);
        store.put(uri, payload.as_bytes())?;
        info!(
            "[ltv:write] uploaded {} rows of {} data to {}",
            table.height(),
            label,
            uri
        );
    }
    Ok(locations)
}

/// Headed CSV of `table` with a `predictions` column right after the target.
///
/// Without a target column the predictions column is appended last.
pub fn predictions_csv(table: &Table, predictions: &[f64]) -> Result<CsvPayload, PipelineError> {
    if predictions.len() != table.height() {
        return Err(PipelineError::Data(format!(
            "{} predictions for {} rows",
            predictions.len(),
            table.height()
        )));
    }
    let insert_at = table
        .schema()
        .target_index()
        .map(|idx| idx + 1)
        .unwrap_or(table.width());

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    let mut header: Vec<String> = table.schema().names().map(str::to_string).collect();
    header.insert(insert_at, PREDICTIONS_COLUMN.to_string());
    writer.write_record(&header)?;
    for (row, prediction) in table.rows().iter().zip(predictions) {
        let mut cells: Vec<String> = row.iter().map(|value| value.to_string()).collect();
        cells.insert(insert_at, prediction.to_string());
        writer.write_record(&cells)?;
    }
    finish(writer)
}

/// `<dir>/<stem>_predictions.csv` next to the split file.
pub fn predictions_uri(split_uri: &ObjectUri, stem: &str) -> ObjectUri {
    let parent = match split_uri.key.rsplit_once('/') {
        Some((dir, _)) => ObjectUri::new(split_uri.bucket.clone(), dir),
        None => ObjectUri::new(split_uri.bucket.clone(), ""),
    };
    parent.join(&format!("{stem}{PREDICTIONS_SUFFIX}"))
}

/// Serialize and upload a predictions export.
pub fn write_predictions(
    store: &dyn ObjectStore,
    uri: &ObjectUri,
    table: &Table,
    predictions: &[f64],
) -> Result<(), PipelineError> {
    let payload = predictions_csv(table, predictions)?;
    store.put(uri, payload.as_bytes())?;
    info!(
        "[ltv:write] exported {} predictions to {}",
        predictions.len(),
        uri
    );
    Ok(())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<CsvPayload, PipelineError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| PipelineError::Csv(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| PipelineError::Csv(err.to_string()))
}
