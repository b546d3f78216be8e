//! Model Service - lifecycle of the single active model
//!
//! One lifecycle lock serializes load-or-train and train-from-source. The
//! active handle lives in a separate slot so predictions only clone an `Arc`
//! and score without holding any lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::booster::{checksum, write_atomic, BoostParams, Booster};
use crate::dataset::{self, FeatureRows, SYNTHETIC_FEATURES, SYNTHETIC_ROWS, SYNTHETIC_SEED};
use crate::error::ModelResult;
use crate::publish::{self, PublishStrategy};


// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Where the active handle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// Deserialized from the canonical path
    Loaded,
    /// Bootstrapped from the fixed-seed demo dataset
    Synthetic,
    /// Fitted from a CSV source
    Trained,
}

/// Metadata of the active model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub source: ModelSource,
    pub artifact_path: PathBuf,
    pub feature_count: usize,
    pub trained_at: DateTime<Utc>,
    pub activated_at: DateTime<Utc>,
    pub checksum: String,
}

/// Status for the `/model` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub model_path: PathBuf,
    pub publish_strategy: PublishStrategy,
    pub active: Option<ModelInfo>,
}

struct ActiveModel {
    booster: Arc<Booster>,
    info: ModelInfo,
}

/// State owned by whoever holds the lifecycle lock
#[derive(Default)]
struct Lifecycle {
    last_stamp: Option<NaiveDateTime>,
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ModelService {
    model_path: PathBuf,
    params: BoostParams,
    strategy: PublishStrategy,
    lifecycle: Mutex<Lifecycle>,
    active: RwLock<Option<ActiveModel>>,
}

impl ModelService {
    /// Create a service for `model_path`, probing its directory for symlink support
    pub fn new(model_path: impl Into<PathBuf>, params: BoostParams) -> ModelResult<Self> {
        let model_path = model_path.into();
        let strategy = PublishStrategy::detect(&publish::model_dir(&model_path))?;
        Ok(Self::with_strategy(model_path, params, strategy))
    }

    pub fn with_strategy(model_path: impl Into<PathBuf>, params: BoostParams, strategy: PublishStrategy) -> Self {
        Self {
            model_path: model_path.into(),
            params,
            strategy,
            lifecycle: Mutex::new(Lifecycle::default()),
            active: RwLock::new(None),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Active handle, if any
    pub fn current(&self) -> Option<Arc<Booster>> {
        self.active.read().as_ref().map(|m| Arc::clone(&m.booster))
    }

    /// Make sure a handle is loaded: load the canonical file, or train and
    /// publish the demo model when there is none.
    pub fn ensure_ready(&self) -> ModelResult<Arc<Booster>> {
        if let Some(booster) = self.current() {
            return Ok(booster);
        }

        let mut lifecycle = self.lifecycle.lock();
        // Another caller may have finished while we waited for the lock.
        if let Some(booster) = self.current() {
            return Ok(booster);
        }

        if self.model_path.exists() {
            tracing::info!("Loading model from {}", self.model_path.display());
            let (booster, sum) = Booster::load(&self.model_path)?;
            let booster = self.activate(booster, ModelSource::Loaded, self.model_path.clone(), sum);
            return Ok(booster);
        }

        tracing::warn!(
            "No model at {}, training demo model on synthetic data",
            self.model_path.display()
        );
        let set = dataset::synthetic(SYNTHETIC_SEED, SYNTHETIC_ROWS, SYNTHETIC_FEATURES);
        let booster = Booster::fit(&set, &BoostParams::demo())?;
        let (_, booster) = self.persist(&mut lifecycle, booster, ModelSource::Synthetic)?;
        Ok(booster)
    }

    /// Fit a new model on the CSV at `source`, publish it and make it active.
    /// Returns the versioned path written. On failure nothing changes.
    pub fn train_from_source(&self, source: &Path) -> ModelResult<PathBuf> {
        let mut lifecycle = self.lifecycle.lock();

        let set = dataset::load_csv(source)?;
        let started = std::time::Instant::now();
        let booster = Booster::fit(&set, &self.params)?;
        tracing::info!(
            "Trained model on {} ({} rows) in {:.2?}",
            source.display(),
            set.n_rows(),
            started.elapsed()
        );

        let (path, _) = self.persist(&mut lifecycle, booster, ModelSource::Trained)?;
        Ok(path)
    }

    /// One probability per row, in input order
    pub fn predict(&self, rows: FeatureRows) -> ModelResult<Vec<f32>> {
        let booster = self.ensure_ready()?;
        let matrix = rows.into_matrix()?;
        booster.predict_proba(&matrix)
    }

    pub fn status(&self) -> ModelStatus {
        let active = self.active.read().as_ref().map(|m| m.info.clone());
        ModelStatus {
            loaded: active.is_some(),
            model_path: self.model_path.clone(),
            publish_strategy: self.strategy,
            active,
        }
    }

    /// Write a new version, repoint the canonical path, then swap the handle.
    /// Requires the lifecycle lock.
    fn persist(
        &self,
        lifecycle: &mut Lifecycle,
        booster: Booster,
        source: ModelSource,
    ) -> ModelResult<(PathBuf, Arc<Booster>)> {
        let dir = publish::model_dir(&self.model_path);
        fs::create_dir_all(&dir)?;

        let ext = publish::model_extension(&self.model_path);
        let (versioned, stamp) = publish::next_versioned_path(&dir, &ext, Local::now(), lifecycle.last_stamp);

        let bytes = booster.to_bytes()?;
        write_atomic(&versioned, &bytes)?;
        lifecycle.last_stamp = Some(stamp);

        if let Err(e) = self.strategy.publish(&versioned, &self.model_path, &bytes) {
            tracing::error!(
                "Wrote {} but failed to publish it to {}: {}",
                versioned.display(),
                self.model_path.display(),
                e
            );
            return Err(e);
        }

        tracing::info!(
            "Saved model {} and published to {} ({})",
            versioned.display(),
            self.model_path.display(),
            self.strategy
        );

        let booster = self.activate(booster, source, versioned.clone(), checksum(&bytes));
        Ok((versioned, booster))
    }

    fn activate(&self, booster: Booster, source: ModelSource, artifact_path: PathBuf, checksum: String) -> Arc<Booster> {
        let info = ModelInfo {
            source,
            artifact_path,
            feature_count: booster.feature_count(),
            trained_at: booster.trained_at(),
            activated_at: Utc::now(),
            checksum,
        };
        let booster = Arc::new(booster);
        *self.active.write() = Some(ActiveModel {
            booster: Arc::clone(&booster),
            info,
        });
        booster
    }
}

/// Run a blocking service call on tokio's blocking pool
pub async fn blocking<F, T>(service: &Arc<ModelService>, f: F) -> ModelResult<T>
where
    F: FnOnce(&ModelService) -> ModelResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service)).await?
}
