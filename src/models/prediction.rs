//! Prediction models

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::FeatureRows;
use crate::error::ModelResult;

/// `features` is `[[f1..fn], ...]` or a single `[f1..fn]`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Value,
}

impl PredictRequest {
    pub fn rows(&self) -> ModelResult<FeatureRows> {
        FeatureRows::from_json(&self.features)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<f32>,
}
