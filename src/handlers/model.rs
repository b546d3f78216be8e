//! Active model status handler

use axum::{extract::State, Json};

use crate::AppState;
use crate::service::ModelStatus;

pub async fn status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.service.status())
}
