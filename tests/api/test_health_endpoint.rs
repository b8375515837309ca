// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Health endpoint tests for GET /health

use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use image::DynamicImage;
use nutriscan_detector::{
    api::http_server::{create_app, AppState, HealthResponse},
    storage::{LocalBucket, MockBucket},
    version::VERSION,
    vision::{Detection, LabelMap, ObjectDetector},
};
use std::sync::Arc;
use tower::util::ServiceExt;

struct IdleDetector {
    labels: LabelMap,
}

impl ObjectDetector for IdleDetector {
    fn name(&self) -> &str {
        "yolov8n-food"
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

fn idle_detector() -> Arc<IdleDetector> {
    Arc::new(IdleDetector {
        labels: LabelMap::from_names(["apple", "banana", "egg", "rice"]),
    })
}

async fn get_health(state: AppState) -> (StatusCode, HealthResponse) {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = create_app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_model_and_storage() {
    let state = AppState::new(Arc::new(MockBucket::new()), idle_detector());

    let (status, health) = get_health(state).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, VERSION);
    assert_eq!(health.model, "yolov8n-food");
    assert_eq!(health.labels, 4);
    assert_eq!(health.storage, "mock://memory");
    assert!(health.uptime_seconds >= 0);
}

#[tokio::test]
async fn test_health_describes_local_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(Arc::new(LocalBucket::new(dir.path())), idle_detector());

    let (status, health) = get_health(state).await;

    assert_eq!(status, StatusCode::OK);
    assert!(health.storage.contains(&dir.path().display().to_string()));
}

#[tokio::test]
async fn test_health_post_not_allowed() {
    let state = AppState::new(Arc::new(MockBucket::new()), idle_detector());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = create_app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
