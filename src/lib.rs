//! ML Server
//!
//! Serves a gradient-boosted binary classifier over HTTP and retrains it from
//! CSV on a daily schedule.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ML SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐        ┌──────────────────────────────────┐  │
//! │  │  HTTP API │───────►│  ModelService (lifecycle lock)   │  │
//! │  │  (Axum)   │        │   dataset · booster · publish    │  │
//! │  └───────────┘        └────────────────▲─────────────────┘  │
//! │  ┌───────────────────────┐             │                    │
//! │  │ RetrainScheduler      │─────────────┘                    │
//! │  │ (daily, cancellable)  │                                  │
//! │  └───────────────────────┘                                  │
//! │                 models/model_<ts>.json + model.json         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod booster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod publish;
pub mod scheduler;
pub mod service;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use config::Config;
pub use error::{AppError, AppResult, ModelError, ModelResult};
pub use service::ModelService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ModelService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(service: Arc<ModelService>, config: Config) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::predict))
        .route("/train", post(handlers::train::train))
        .route("/model", get(handlers::model::status))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
