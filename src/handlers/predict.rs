//! Prediction handler

use axum::{extract::State, Json};

use crate::{AppState, AppResult};
use crate::models::{PredictRequest, PredictResponse};
use crate::service;

/// Score one probability per input row
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> AppResult<Json<PredictResponse>> {
    let rows = req.rows()?;
    let count = rows.n_rows();

    let predictions = service::blocking(&state.service, move |s| s.predict(rows)).await?;
    tracing::debug!("Predicted {} rows", count);

    Ok(Json(PredictResponse { predictions }))
}
