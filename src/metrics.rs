use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::metrics::DEFAULT_HISTOGRAM_BINS;
use crate::errors::PipelineError;

fn check_lengths(predictions: &[f64], actuals: &[f64]) -> Result<(), PipelineError> {
    if predictions.len() != actuals.len() {
        return Err(PipelineError::Data(format!(
            "{} predictions for {} actual values",
            predictions.len(),
            actuals.len()
        )));
    }
    if predictions.is_empty() {
        return Err(PipelineError::Data(
            "cannot evaluate an empty prediction set".to_string(),
        ));
    }
    Ok(())
}

/// Root mean squared error, `sqrt(mean((p - a)^2))`.
pub fn rmse(predictions: &[f64], actuals: &[f64]) -> Result<f64, PipelineError> {
    check_lengths(predictions, actuals)?;
    let sum: f64 = predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a).powi(2))
        .sum();
    Ok((sum / predictions.len() as f64).sqrt())
}

/// Mean absolute error.
pub fn mae(predictions: &[f64], actuals: &[f64]) -> Result<f64, PipelineError> {
    check_lengths(predictions, actuals)?;
    let sum: f64 = predictions.iter().zip(actuals).map(|(p, a)| (p - a).abs()).sum();
    Ok(sum / predictions.len() as f64)
}

/// `actual - prediction` per row.
pub fn residuals(predictions: &[f64], actuals: &[f64]) -> Result<Vec<f64>, PipelineError> {
    check_lengths(predictions, actuals)?;
    Ok(actuals.iter().zip(predictions).map(|(a, p)| a - p).collect())
}

/// One point of the actual-vs-predicted scatter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    /// Ground truth.
    pub actual: f64,
    /// Model output.
    pub predicted: f64,
}

/// Fixed-width histogram bin, `[lower, upper)` except the last which is closed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Inclusive lower edge.
    pub lower: f64,
    /// Upper edge.
    pub upper: f64,
    /// Residuals falling in the bin.
    pub count: usize,
}

/// Evaluation summary for one prediction set, ready to serialize for plotting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResidualDiagnostics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean residual; positive means the model under-predicts.
    pub mean_residual: f64,
    /// Actual vs. predicted, in row order.
    pub scatter: Vec<ScatterPoint>,
    /// Residual distribution.
    pub histogram: Vec<HistogramBin>,
}

impl ResidualDiagnostics {
    /// Diagnostics with `DEFAULT_HISTOGRAM_BINS` bins.
    pub fn compute(predictions: &[f64], actuals: &[f64]) -> Result<Self, PipelineError> {
        Self::with_bins(predictions, actuals, DEFAULT_HISTOGRAM_BINS)
    }

    /// Diagnostics with `bins` histogram bins.
    pub fn with_bins(
        predictions: &[f64],
        actuals: &[f64],
        bins: usize,
    ) -> Result<Self, PipelineError> {
        if bins == 0 {
            return Err(PipelineError::Configuration(
                "histogram needs at least one bin".to_string(),
            ));
        }
        let residuals = residuals(predictions, actuals)?;
        let diagnostics = Self {
            rmse: rmse(predictions, actuals)?,
            mae: mae(predictions, actuals)?,
            mean_residual: residuals.iter().sum::<f64>() / residuals.len() as f64,
            scatter: actuals
                .iter()
                .zip(predictions)
                .map(|(&actual, &predicted)| ScatterPoint { actual, predicted })
                .collect(),
            histogram: histogram(&residuals, bins),
        };
        info!(
            "[ltv:eval] rows={} rmse={:.4} mae={:.4} mean_residual={:.4}",
            residuals.len(),
            diagnostics.rmse,
            diagnostics.mae,
            diagnostics.mean_residual
        );
        Ok(diagnostics)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Fixed-width histogram of non-empty `values` spanning their range.
fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|idx| HistogramBin {
            lower: min + width * idx as f64,
            upper: if idx + 1 == bins {
                max
            } else {
                min + width * (idx + 1) as f64
            },
            count: 0,
        })
        .collect();
    for &value in values {
        let idx = if width > 0.0 {
            (((value - min) / width) as usize).min(bins - 1)
        } else {
            0
        };
        out[idx].count += 1;
    }
    out
}
