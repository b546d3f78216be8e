//! ML Server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use ml_server::{config::Config, create_router, logging, scheduler::RetrainScheduler, service, AppState, ModelService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    let _log_guards = logging::init(&config)?;

    tracing::info!("ML Server v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!("Model path: {}", config.model_path.display());

    let service = Arc::new(
        ModelService::new(config.model_path.clone(), config.boost.clone())
            .context("Failed to initialize model service")?,
    );

    // Make sure a model is available before accepting requests
    service::blocking(&service, |s| s.ensure_ready().map(|_| ()))
        .await
        .context("Failed to load or train the initial model")?;

    let scheduler = if config.scheduler_disabled {
        tracing::info!("Retrain scheduler disabled");
        None
    } else {
        Some(RetrainScheduler::spawn(
            Arc::clone(&service),
            config.train_data_path.clone(),
            config.retrain_at,
        ))
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;

    let app = create_router(AppState::new(service, config));

    tracing::info!("🚀 Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down...");
}
