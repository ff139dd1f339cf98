//! Inference clients.
//!
//! Two modes share the same model:
//! - `BatchPredictor` sends fixed-size row chunks to a hosted endpoint and
//!   concatenates the responses in input order.
//! - `transform::BatchTransformClient` submits one asynchronous batch job over
//!   a stored CSV and polls it to completion.

use tracing::{debug, info};

use crate::data::{Row, Table};
use crate::errors::PipelineError;
use crate::types::CsvPayload;
use crate::writer::rows_to_csv;

/// Asynchronous batch transform jobs.
pub mod transform;

pub use transform::{
    BatchTransformClient, TransformInput, TransformJobRequest, TransformOutput, TransformService,
    build_transform_request,
};

/// Deployed model accepting synchronous CSV requests.
pub trait PredictionEndpoint: Send + Sync {
    /// Endpoint name, for logs.
    fn name(&self) -> &str;
    /// Send a headerless CSV payload of feature rows; returns one prediction per row.
    fn invoke(&self, payload: &str) -> Result<CsvPayload, PipelineError>;
}

/// Parse an endpoint response: numbers separated by commas and/or newlines.
pub fn parse_predictions(body: &str) -> Result<Vec<f64>, PipelineError> {
    body.split([',', '\n'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                PipelineError::Endpoint(format!("response value '{token}' is not a number"))
            })
        })
        .collect()
}

/// Chunked synchronous prediction over a `PredictionEndpoint`.
pub struct BatchPredictor<'a> {
    endpoint: &'a dyn PredictionEndpoint,
    chunk_size: usize,
}

impl<'a> BatchPredictor<'a> {
    /// Predictor sending at most `chunk_size` rows per request.
    pub fn new(endpoint: &'a dyn PredictionEndpoint, chunk_size: usize) -> Result<Self, PipelineError> {
        if chunk_size == 0 {
            return Err(PipelineError::Configuration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            endpoint,
            chunk_size,
        })
    }

    /// Rows per request.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Predict every row of `table`, which must not contain the target column.
    pub fn predict_table(&self, table: &Table) -> Result<Vec<f64>, PipelineError> {
        if let Some(idx) = table.schema().target_index() {
            return Err(PipelineError::Data(format!(
                "inference input still contains target column '{}'",
                table.schema().name_at(idx).unwrap_or("?")
            )));
        }
        self.predict_rows(table.rows())
    }

    /// Predict `rows` chunk by chunk; the last chunk absorbs the remainder.
    ///
    /// Output order and length match the input.
    pub fn predict_rows(&self, rows: &[Row]) -> Result<Vec<f64>, PipelineError> {
        let mut predictions = Vec::with_capacity(rows.len());
        let chunks = rows.len().div_ceil(self.chunk_size);
        for (chunk_idx, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let payload = rows_to_csv(chunk)?;
            let body = self.endpoint.invoke(&payload)?;
            let values = parse_predictions(&body)?;
            if values.len() != chunk.len() {
                return Err(PipelineError::Endpoint(format!(
                    "endpoint '{}' returned {} predictions for {} rows in chunk {}",
                    self.endpoint.name(),
                    values.len(),
                    chunk.len(),
                    chunk_idx
                )));
            }
            debug!(
                "[ltv:predict] chunk {}/{} ({} rows) via '{}'",
                chunk_idx + 1,
                chunks,
                chunk.len(),
                self.endpoint.name()
            );
            predictions.extend(values);
        }
        info!(
            "[ltv:predict] {} predictions from '{}' in {} requests",
            predictions.len(),
            self.endpoint.name(),
            chunks
        );
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::schema::{ColumnSpec, Schema};
    use std::sync::Mutex;

    /// Predicts `2 * first column` and records request sizes.
    struct DoublingEndpoint {
        requests: Mutex<Vec<usize>>,
    }

    impl DoublingEndpoint {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl PredictionEndpoint for DoublingEndpoint {
        fn name(&self) -> &str {
            "doubling"
        }

        fn invoke(&self, payload: &str) -> Result<CsvPayload, PipelineError> {
            let lines: Vec<&str> = payload.lines().collect();
            self.requests.lock().unwrap().push(lines.len());
            let values: Vec<String> = lines
                .iter()
                .map(|line| {
                    let first: f64 = line.split(',').next().unwrap().parse().unwrap();
                    (first * 2.0).to_string()
                })
                .collect();
            Ok(values.join(","))
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|idx| vec![Value::Number(idx as f64), Value::Flag(idx % 2 == 0)])
            .collect()
    }

    #[test]
    fn chunking_preserves_order_and_length() {
        let endpoint = DoublingEndpoint::new();
        let chunked = BatchPredictor::new(&endpoint, 3)
            .unwrap()
            .predict_rows(&rows(10))
            .unwrap();
        assert_eq!(*endpoint.requests.lock().unwrap(), vec![3, 3, 3, 1]);

        let single = BatchPredictor::new(&DoublingEndpoint::new(), 10)
            .unwrap()
            .predict_rows(&rows(10))
            .unwrap();
        assert_eq!(chunked, single);
        assert_eq!(chunked, (0..10).map(|idx| idx as f64 * 2.0).collect::<Vec<_>>());
    }

    #[test]
    fn zero_chunk_size_is_a_configuration_error() {
        let endpoint = DoublingEndpoint::new();
        assert!(matches!(
            BatchPredictor::new(&endpoint, 0),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_tables_with_the_target() {
        let schema = Schema::new(vec![
            ColumnSpec::continuous("fee"),
            ColumnSpec::target("revenue"),
        ])
        .unwrap();
        let table = Table::new(schema, vec![vec![Value::Number(1.0), Value::Number(2.0)]]).unwrap();
        let endpoint = DoublingEndpoint::new();
        let predictor = BatchPredictor::new(&endpoint, 500).unwrap();
        assert!(matches!(
            predictor.predict_table(&table),
            Err(PipelineError::Data(_))
        ));
        assert!(endpoint.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn short_responses_are_reported() {
        struct Truncating;
        impl PredictionEndpoint for Truncating {
            fn name(&self) -> &str {
                "truncating"
            }
            fn invoke(&self, _payload: &str) -> Result<CsvPayload, PipelineError> {
                Ok("1.0".to_string())
            }
        }
        let err = BatchPredictor::new(&Truncating, 4)
            .unwrap()
            .predict_rows(&rows(4))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Endpoint(ref msg) if msg.contains("1 predictions for 4 rows")));
    }

    #[test]
    fn parses_comma_and_newline_separated_bodies() {
        assert_eq!(
            parse_predictions("1.5,2\n3.25\n").unwrap(),
            vec![1.5, 2.0, 3.25]
        );
        assert!(parse_predictions("1.0,abc").is_err());
        assert!(parse_predictions("").unwrap().is_empty());
    }
}
