//! Seeded train/validation/test partitioning.
//!
//! Rows are shuffled once with a seeded permutation, then sliced into three
//! contiguous blocks at the cumulative `train` and `train + validation`
//! fractions. The same seed always yields the same partition.

use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::splits::{
    ALL_SPLITS, CUT_EPSILON, DEFAULT_TEST_FRACTION, DEFAULT_TRAIN_FRACTION,
    DEFAULT_VALIDATION_FRACTION, RATIO_SUM_TOLERANCE,
};
use crate::data::Table;
use crate::errors::PipelineError;

/// Logical dataset partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// Lowercase name used in object keys and file names.
    pub fn as_str(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "validation",
            SplitLabel::Test => "test",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratio configuration for train/validation/test assignment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train.
    pub train: f64,
    /// Fraction assigned to validation.
    pub validation: f64,
    /// Fraction assigned to test.
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: DEFAULT_TRAIN_FRACTION,
            validation: DEFAULT_VALIDATION_FRACTION,
            test: DEFAULT_TEST_FRACTION,
        }
    }
}

impl SplitRatios {
    /// Validate that ratios are finite, non-negative, and sum to `1.0` (within epsilon).
    pub fn normalized(self) -> Result<Self, PipelineError> {
        if [self.train, self.validation, self.test]
            .iter()
            .any(|ratio| !ratio.is_finite())
        {
            return Err(PipelineError::Configuration(
                "split ratios must be finite".to_string(),
            ));
        }
        if self.train < 0.0 || self.validation < 0.0 || self.test < 0.0 {
            return Err(PipelineError::Configuration(
                "split ratios must be non-negative".to_string(),
            ));
        }
        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(PipelineError::Configuration(
                "split ratios must sum to 1.0".to_string(),
            ));
        }
        Ok(self)
    }

    /// Cut points `(floor(train * n), floor((train + validation) * n))`.
    pub fn cut_points(&self, total: usize) -> (usize, usize) {
        let train_cut = floor_fraction(total, self.train);
        let val_cut = floor_fraction(total, self.train + self.validation).max(train_cut);
        (train_cut, val_cut)
    }
}

fn floor_fraction(total: usize, fraction: f64) -> usize {
    let raw = (total as f64 * fraction + CUT_EPSILON).floor();
    (raw.max(0.0) as usize).min(total)
}

/// Small deterministic RNG (SplitMix64) used for reproducible shuffles.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Seed a new generator.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let bytes = self.next_u64_internal().to_le_bytes();
            let copy_len = (dest.len() - offset).min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// Seeded permutation of `0..total`.
pub fn seeded_permutation(total: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = DeterministicRng::new(seed);
    indices.shuffle(&mut rng);
    indices
}

/// Row indices assigned to each split, in permutation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetSplit {
    /// Train rows.
    pub train: Vec<usize>,
    /// Validation rows.
    pub validation: Vec<usize>,
    /// Test rows.
    pub test: Vec<usize>,
}

impl DatasetSplit {
    /// Indices for `label`.
    pub fn indices(&self, label: SplitLabel) -> &[usize] {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    /// `(train, validation, test)` sizes.
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.validation.len(), self.test.len())
    }

    /// Total rows across all splits.
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Partition `0..total` with a seeded shuffle and contiguous slicing.
///
/// Small inputs may leave a split empty; that is not an error.
pub fn split_indices(
    total: usize,
    seed: u64,
    ratios: SplitRatios,
) -> Result<DatasetSplit, PipelineError> {
    let ratios = ratios.normalized()?;
    let permutation = seeded_permutation(total, seed);
    let (train_cut, val_cut) = ratios.cut_points(total);
    let split = DatasetSplit {
        train: permutation[..train_cut].to_vec(),
        validation: permutation[train_cut..val_cut].to_vec(),
        test: permutation[val_cut..].to_vec(),
    };
    let (train, validation, test) = split.sizes();
    info!(
        "[ltv:split] seed={} rows={} -> train={} validation={} test={}",
        seed, total, train, validation, test
    );
    Ok(split)
}

/// Materialized split tables.
#[derive(Clone, Debug)]
pub struct SplitTables {
    /// Train rows.
    pub train: Table,
    /// Validation rows.
    pub validation: Table,
    /// Test rows.
    pub test: Table,
}

impl SplitTables {
    /// Table for `label`.
    pub fn get(&self, label: SplitLabel) -> &Table {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    /// Iterate `(label, table)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (SplitLabel, &Table)> {
        ALL_SPLITS.into_iter().map(move |label| (label, self.get(label)))
    }
}

/// Split `table` rows into train/validation/test tables.
pub fn split_table(
    table: &Table,
    seed: u64,
    ratios: SplitRatios,
) -> Result<SplitTables, PipelineError> {
    let split = split_indices(table.height(), seed, ratios)?;
    Ok(SplitTables {
        train: table.take(&split.train)?,
        validation: table.take(&split.validation)?,
        test: table.take(&split.test)?,
    })
}
