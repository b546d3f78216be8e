//! Training handler

use axum::{body::Bytes, extract::State, Json};
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::models::{TrainRequest, TrainResponse};
use crate::service;

/// Train from CSV. Source path: request body, then `TRAIN_DATA_PATH`, then the default.
pub async fn train(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<TrainResponse>> {
    let req: TrainRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TrainRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e)))?
    };
    req.validate()?;

    let data_path = state.config.resolve_data_path(req.data_path.as_deref());
    tracing::info!("Training requested from {}", data_path.display());

    let model_path = service::blocking(&state.service, move |s| s.train_from_source(&data_path)).await?;

    Ok(Json(TrainResponse::trained(model_path.display().to_string())))
}
