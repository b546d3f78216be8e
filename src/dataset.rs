//! Training data and prediction inputs
//!
//! CSV files are numeric, comma separated, with the binary label in the last
//! column. A single header row is tolerated.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// Seed of the demo dataset trained when no model exists yet
pub const SYNTHETIC_SEED: u64 = 42;
pub const SYNTHETIC_ROWS: usize = 200;
pub const SYNTHETIC_FEATURES: usize = 6;

/// Feature matrix plus binary labels, row-aligned
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<bool>,
}

impl TrainingSet {
    /// Split numeric rows into features (all but last column) and label (last column)
    pub fn from_rows(rows: Vec<Vec<f32>>) -> ModelResult<Self> {
        let width = match rows.first() {
            Some(row) => row.len(),
            None => return Err(ModelError::validation("Training data contains no rows")),
        };
        if width < 2 {
            return Err(ModelError::validation(
                "Training data must have at least 2 columns (features + target)",
            ));
        }

        let mut features = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row.len() != width {
                return Err(ModelError::validation(format!(
                    "Training rows have inconsistent width: expected {}, got {}",
                    width,
                    row.len()
                )));
            }
            let label = row.pop().unwrap_or_default();
            // Label is truncated to an integer; anything non-zero is the positive class.
            labels.push(label.trunc() as i64 != 0);
            features.push(row);
        }

        Ok(Self { features, labels })
    }

    pub fn n_rows(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.first().map(Vec::len).unwrap_or(0)
    }
}

/// Load a training set from CSV.
///
/// The whole file is first parsed as numeric rows; if that fails the parse is
/// retried with the first row treated as a header. A header made only of
/// numbers (`1,2,3`) therefore parses on the first pass and is trained on as
/// a data row. Non-finite values (`nan`, `inf`) are rejected.
pub fn load_csv(path: &Path) -> ModelResult<TrainingSet> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }

    let rows = match read_numeric_rows(path, false) {
        Ok(rows) => rows,
        Err(ModelError::Validation(first)) => {
            tracing::debug!("{} is not fully numeric ({}), retrying with header row", path.display(), first);
            read_numeric_rows(path, true)?
        }
        Err(e) => return Err(e),
    };

    let set = TrainingSet::from_rows(rows)?;
    tracing::info!(
        "Loaded training data from {}: {} rows, {} features",
        path.display(),
        set.n_rows(),
        set.n_features()
    );
    Ok(set)
}

fn read_numeric_rows(path: &Path, skip_header: bool) -> ModelResult<Vec<Vec<f32>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(skip_header)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let row = record
            .iter()
            .map(|field| {
                match field.parse::<f32>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(ModelError::validation(format!(
                        "Non-numeric value '{}' in training data row {}",
                        field,
                        idx + 1
                    ))),
                }
            })
            .collect::<ModelResult<Vec<f32>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

fn csv_error(err: csv::Error) -> ModelError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => ModelError::Io(e),
        csv::ErrorKind::UnequalLengths { pos, expected_len, len } => ModelError::validation(format!(
            "Training rows have inconsistent width: expected {}, got {}{}",
            expected_len,
            len,
            pos.map(|p| format!(" at line {}", p.line())).unwrap_or_default()
        )),
        other => ModelError::validation(format!("Malformed CSV: {:?}", other)),
    }
}

/// Fixed-seed demo dataset: `x0 + 0.5*x1 - 0.2*x2 + noise > 0`
pub fn synthetic(seed: u64, n_rows: usize, n_features: usize) -> TrainingSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_rows);
    for _ in 0..n_rows {
        features.push((0..n_features).map(|_| standard_normal(&mut rng)).collect::<Vec<f32>>());
    }

    let labels = features
        .iter()
        .map(|row| {
            let at = |i: usize| row.get(i).copied().unwrap_or(0.0);
            at(0) + 0.5 * at(1) - 0.2 * at(2) + 0.3 * standard_normal(&mut rng) > 0.0
        })
        .collect();

    TrainingSet { features, labels }
}

// Box-Muller
fn standard_normal(rng: &mut StdRng) -> f32 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}

/// Prediction input: one flat row or a batch of rows
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureRows {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

impl FeatureRows {
    /// Interpret a JSON value as either `[f, ...]` or `[[f, ...], ...]`
    pub fn from_json(value: &Value) -> ModelResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| ModelError::validation("features must be an array"))?;

        if items.iter().all(Value::is_array) && !items.is_empty() {
            let rows = items
                .iter()
                .enumerate()
                .map(|(i, row)| numeric_row(row, i))
                .collect::<ModelResult<Vec<_>>>()?;
            Ok(FeatureRows::Batch(rows))
        } else {
            Ok(FeatureRows::Single(numeric_row(value, 0)?))
        }
    }

    pub fn n_rows(&self) -> usize {
        match self {
            FeatureRows::Single(_) => 1,
            FeatureRows::Batch(rows) => rows.len(),
        }
    }

    /// Normalize into a rectangular matrix; a single row becomes a batch of one
    pub fn into_matrix(self) -> ModelResult<Vec<Vec<f32>>> {
        let rows = match self {
            FeatureRows::Single(row) => vec![row],
            FeatureRows::Batch(rows) => rows,
        };

        let width = match rows.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Err(ModelError::validation("features must not be empty")),
        };
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ModelError::validation(format!(
                "Row {} has {} features, expected {}",
                i,
                row.len(),
                width
            )));
        }
        Ok(rows)
    }
}

fn numeric_row(value: &Value, index: usize) -> ModelResult<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| ModelError::validation(format!("Row {} is not an array", index)))?;
    items
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).filter(|f| f.is_finite()).ok_or_else(|| {
                ModelError::validation(format!("Row {} contains non-numeric value {}", index, v))
            })
        })
        .collect()
}
