//! Gradient-boosted tree classifier backed by the `gbdt` crate
//!
//! The on-disk artifact is a JSON envelope around the serialized `GBDT` so the
//! feature count and the initial score survive a reload.

use std::fmt;
use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gbdt::config::Config as GbdtConfig;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dataset::TrainingSet;
use crate::error::{ModelError, ModelResult};

/// Bumped when the envelope layout changes
pub const ARTIFACT_VERSION: u32 = 2;

/// Binary log-likelihood loss; labels are encoded as +1 / -1
const LOSS: &str = "LogLikelyhood";

/// Keeps the initial score finite when every label is the same class
const PRIOR_EPS: f32 = 1e-6;

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub num_boost_round: usize,
    pub learning_rate: f32,
    pub max_depth: u32,
    pub min_leaf_size: usize,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            num_boost_round: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_leaf_size: 1,
        }
    }
}

impl BoostParams {
    /// Small model used for the synthetic bootstrap
    pub fn demo() -> Self {
        Self {
            num_boost_round: 20,
            ..Self::default()
        }
    }
}

/// A trained model. Immutable once built.
pub struct Booster {
    model: GBDT,
    feature_count: usize,
    initial_guess: f32,
    trained_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    feature_count: usize,
    initial_guess: f32,
    trained_at: DateTime<Utc>,
    model: &'a GBDT,
}

#[derive(Deserialize)]
struct Artifact {
    version: u32,
    feature_count: usize,
    initial_guess: f32,
    trained_at: DateTime<Utc>,
    model: GBDT,
}

impl fmt::Debug for Booster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Booster")
            .field("feature_count", &self.feature_count)
            .field("initial_guess", &self.initial_guess)
            .field("trained_at", &self.trained_at)
            .finish_non_exhaustive()
    }
}

impl Booster {
    /// Fit a new model on every row of `set`
    pub fn fit(set: &TrainingSet, params: &BoostParams) -> ModelResult<Self> {
        let feature_count = set.n_features();
        if feature_count == 0 || set.n_rows() == 0 {
            return Err(ModelError::validation("Cannot train on an empty dataset"));
        }

        let mut config = GbdtConfig::new();
        config.set_feature_size(feature_count);
        config.set_shrinkage(params.learning_rate);
        config.set_max_depth(params.max_depth);
        config.set_iterations(params.num_boost_round);
        config.set_min_leaf_size(params.min_leaf_size);
        config.set_loss(LOSS);
        config.set_debug(false);
        // gbdt's own bias is infinite for single-class data, so the starting
        // score is supplied per row instead
        config.enabled_initial_guess(true);

        let initial_guess = initial_guess(&set.labels);
        let mut train: DataVec = set
            .features
            .iter()
            .zip(&set.labels)
            .map(|(row, &positive)| {
                let label = if positive { 1.0 } else { -1.0 };
                Data::new_training_data(row.clone(), 1.0, label, Some(initial_guess))
            })
            .collect();

        let started = std::time::Instant::now();
        let model = panic::catch_unwind(AssertUnwindSafe(move || {
            let mut gbdt = GBDT::new(&config);
            gbdt.fit(&mut train);
            gbdt
        }))
        .map_err(|cause| ModelError::Training(panic_message(cause)))?;

        tracing::debug!(
            "Fitted {} rounds on {}x{} in {:?}",
            params.num_boost_round,
            set.n_rows(),
            feature_count,
            started.elapsed()
        );

        Ok(Self {
            model,
            feature_count,
            initial_guess,
            trained_at: Utc::now(),
        })
    }

    /// Probability of the positive class, one per row
    pub fn predict_proba(&self, rows: &[Vec<f32>]) -> ModelResult<Vec<f32>> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.feature_count) {
            return Err(ModelError::validation(format!(
                "Expected {} features per row, got {}",
                self.feature_count,
                row.len()
            )));
        }

        let data: DataVec = rows
            .iter()
            .map(|row| Data::new_training_data(row.clone(), 1.0, 0.0, Some(self.initial_guess)))
            .collect();

        Ok(self
            .model
            .predict(&data)
            .into_iter()
            .map(|p| p.clamp(0.0, 1.0))
            .collect())
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Serialize the artifact
    pub fn to_bytes(&self) -> ModelResult<Vec<u8>> {
        let artifact = ArtifactRef {
            version: ARTIFACT_VERSION,
            feature_count: self.feature_count,
            initial_guess: self.initial_guess,
            trained_at: self.trained_at,
            model: &self.model,
        };
        Ok(serde_json::to_vec(&artifact)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> ModelResult<Self> {
        let artifact: Artifact = serde_json::from_slice(bytes)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ModelError::validation(format!(
                "Unsupported model artifact version {} (expected {})",
                artifact.version, ARTIFACT_VERSION
            )));
        }
        Ok(Self {
            model: artifact.model,
            feature_count: artifact.feature_count,
            initial_guess: artifact.initial_guess,
            trained_at: artifact.trained_at,
        })
    }

    /// Read an artifact, following symlinks. Returns the model and its SHA-256.
    pub fn load(path: &Path) -> ModelResult<(Self, String)> {
        let bytes = fs::read(path)?;
        let booster = Self::from_bytes(&bytes)?;
        Ok((booster, checksum(&bytes)))
    }
}

/// Half log-odds of the positive rate, the scale `LogLikelyhood` scores on.
/// The rate is clamped so a single-class set still gets a finite score.
fn initial_guess(labels: &[bool]) -> f32 {
    let positives = labels.iter().filter(|&&l| l).count();
    let rate = (positives as f32 / labels.len().max(1) as f32).clamp(PRIOR_EPS, 1.0 - PRIOR_EPS);
    0.5 * (rate / (1.0 - rate)).ln()
}

/// Write to a `.partial` sibling, sync, then rename into place
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ModelResult<()> {
    let tmp = partial_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn panic_message(cause: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "gbdt panicked during fit".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{synthetic, SYNTHETIC_FEATURES, SYNTHETIC_SEED};

    fn small_params() -> BoostParams {
        BoostParams {
            num_boost_round: 10,
            ..BoostParams::default()
        }
    }

    #[test]
    fn test_fit_and_predict_probabilities() {
        let set = synthetic(SYNTHETIC_SEED, 100, SYNTHETIC_FEATURES);
        let booster = Booster::fit(&set, &small_params()).unwrap();

        assert_eq!(booster.feature_count(), SYNTHETIC_FEATURES);

        let preds = booster.predict_proba(&set.features).unwrap();
        assert_eq!(preds.len(), set.n_rows());
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let set = synthetic(SYNTHETIC_SEED, 50, 3);
        let booster = Booster::fit(&set, &small_params()).unwrap();

        let result = booster.predict_proba(&[vec![1.0, 2.0]]);
        assert!(matches!(result, Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_save_load_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let set = synthetic(SYNTHETIC_SEED, 80, 4);
        let booster = Booster::fit(&set, &small_params()).unwrap();

        let bytes = booster.to_bytes().unwrap();
        write_atomic(&path, &bytes).unwrap();
        let (loaded, read) = Booster::load(&path).unwrap();

        assert_eq!(checksum(&bytes), read);
        assert_eq!(loaded.feature_count(), 4);
        assert_eq!(
            booster.predict_proba(&set.features[..5]).unwrap(),
            loaded.predict_proba(&set.features[..5]).unwrap()
        );
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_fit_single_class() {
        let set = TrainingSet::from_rows(vec![
            vec![1.0, 2.0, 1.0],
            vec![-1.0, -2.0, 1.0],
            vec![0.5, 0.5, 1.0],
        ])
        .unwrap();
        let booster = Booster::fit(&set, &small_params()).unwrap();

        let preds = booster.predict_proba(&set.features).unwrap();
        assert_eq!(preds.len(), 3);
        assert!(preds.iter().all(|p| p.is_finite() && *p > 0.5 && *p <= 1.0));
    }

    #[test]
    fn test_initial_guess_is_finite() {
        assert_eq!(initial_guess(&[true, false]), 0.0);
        assert!(initial_guess(&[true, true, true]).is_finite());
        assert!(initial_guess(&[false]) < 0.0);
        assert!(initial_guess(&[true, true, false]) > 0.0);
    }

    #[test]
    fn test_rejects_unknown_artifact_version() {
        let set = synthetic(SYNTHETIC_SEED, 40, 2);
        let booster = Booster::fit(&set, &small_params()).unwrap();

        let mut value: serde_json::Value = serde_json::from_slice(&booster.to_bytes().unwrap()).unwrap();
        value["version"] = serde_json::json!(ARTIFACT_VERSION + 1);
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(matches!(Booster::from_bytes(&bytes), Err(ModelError::Validation(_))));
    }
}
