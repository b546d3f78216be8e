use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::booster::BoostParams;
use crate::publish::{is_versioned_name, PublishStrategy};
use crate::{create_router, AppState, Config, ModelService};

fn app(dir: &Path) -> (Router, Arc<ModelService>) {
    let config = Config {
        model_path: dir.join("models").join("model.json"),
        train_data_path: dir.join("default.csv"),
        ..Config::default()
    };
    let params = BoostParams {
        num_boost_round: 10,
        ..BoostParams::default()
    };
    let service = Arc::new(ModelService::with_strategy(
        config.model_path.clone(),
        params,
        PublishStrategy::Copy,
    ));
    (create_router(AppState::new(Arc::clone(&service), config)), service)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());

    let (status, body) = send(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_predict_bootstraps_and_scores_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (app, service) = app(dir.path());

    let rows = json!({"features": [[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], [-1.0, -1.0, 0.0, 0.0, 0.0, 0.0]]});
    let (status, body) = send(app, "POST", "/predict", Some(rows)).await;

    assert_eq!(status, StatusCode::OK);
    let preds = body["predictions"].as_array().unwrap();
    assert_eq!(preds.len(), 2);
    assert!(preds.iter().all(|p| (0.0..=1.0).contains(&p.as_f64().unwrap())));
    assert!(service.current().is_some());
}

#[tokio::test]
async fn test_predict_rejects_non_numeric() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());

    let (status, body) = send(app, "POST", "/predict", Some(json!({"features": [["a", 1.0]]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_train_then_predict() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());
    let csv = dir.path().join("train.csv");
    fs::write(&csv, "f1,f2,label\n1.0,2.0,1\n-1.0,-2.0,0\n").unwrap();

    let (status, body) = send(
        app.clone(),
        "POST",
        "/train",
        Some(json!({"data_path": csv.display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "trained");
    let model_path = body["model_path"].as_str().unwrap();
    let name = Path::new(model_path).file_name().unwrap().to_string_lossy().into_owned();
    assert!(is_versioned_name(&name));

    let (status, body) = send(app.clone(), "POST", "/predict", Some(json!({"features": [1.0, 2.0]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 1);

    let (status, body) = send(app, "GET", "/model", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], true);
    assert_eq!(body["active"]["source"], "trained");
    assert_eq!(body["active"]["feature_count"], 2);
    assert_eq!(body["publish_strategy"], "copy");
}

#[tokio::test]
async fn test_train_falls_back_to_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());

    // configured default.csv does not exist, empty body uses it
    let (status, body) = send(app.clone(), "POST", "/train", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("default.csv"));

    fs::write(dir.path().join("default.csv"), "0.5,1\n-0.5,0\n0.7,1\n-0.2,0\n").unwrap();
    let (status, _) = send(app, "POST", "/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_train_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (app, service) = app(dir.path());
    let csv = dir.path().join("narrow.csv");
    fs::write(&csv, "1\n0\n").unwrap();

    let (status, _) = send(
        app.clone(),
        "POST",
        "/train",
        Some(json!({"data_path": csv.display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app.clone(), "POST", "/train", Some(json!({"data_path": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // whitespace-only is rejected like empty, not routed to the configured path
    let (status, body) = send(app, "POST", "/train", Some(json!({"data_path": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    assert!(service.current().is_none());
}
