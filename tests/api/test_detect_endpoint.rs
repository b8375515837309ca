// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Detect endpoint tests for POST /detect
//!
//! These tests drive the full router with an in-memory bucket and a
//! scripted detector, so no model weights or network access are needed.

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mockall::mock;
use nutriscan_detector::{
    api::http_server::{create_app, AppState},
    storage::{MockBucket, ObjectStore, StorageError},
    vision::{BoundingBox, Detection, LabelMap, ObjectDetector},
};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

/// Detector that returns a fixed list of class ids for any image
struct ScriptedDetector {
    labels: LabelMap,
    class_ids: Vec<usize>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    fn new(class_ids: Vec<usize>) -> Self {
        Self {
            labels: LabelMap::from_names(["apple", "banana", "rice"]),
            class_ids,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObjectDetector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("session run failed");
        }

        Ok(self
            .class_ids
            .iter()
            .enumerate()
            .map(|(i, &class_id)| Detection {
                bbox: BoundingBox {
                    x: i as f32 * 10.0,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                },
                confidence: 0.9 - i as f32 * 0.1,
                class_id,
            })
            .collect())
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
        async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError>;
        fn describe(&self) -> String;
    }
}

/// Helper: Encode a small solid-colour PNG
fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([200, 40, 40])));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode test PNG");
    buffer.into_inner()
}

/// Helper: Bucket holding one photo under `meal.jpg`
async fn bucket_with_photo() -> MockBucket {
    let bucket = MockBucket::new();
    bucket.insert("meal.jpg", png_bytes()).await;
    bucket
}

fn app_with(bucket: &MockBucket, detector: &Arc<ScriptedDetector>) -> Router {
    let state = AppState::new(Arc::new(bucket.clone()), detector.clone());
    create_app(state)
}

fn post_detect(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/detect")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[cfg(test)]
mod detect_success_tests {
    use super::*;

    /// Test 1: Labels come back in detection order, duplicates kept
    #[tokio::test]
    async fn test_labels_in_detection_order() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0, 1, 0]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "meal.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"labels": ["apple", "banana", "apple"]}));
        assert_eq!(bucket.fetch_count().await, 1);
        assert_eq!(detector.calls(), 1);
    }

    /// Test 2: An image with nothing in it yields an empty list
    #[tokio::test]
    async fn test_no_detections() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(Vec::new()));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "meal.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"labels": []}));
    }

    /// Test 3: Class ids outside the label table still get a name
    #[tokio::test]
    async fn test_unknown_class_id_is_named() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![2, 7]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "meal.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"labels": ["rice", "class_7"]}));
    }

    /// Test 4: The key from the body is passed to the store unchanged
    #[tokio::test]
    async fn test_store_receives_photo_key() {
        let photo = png_bytes();
        let mut store = MockStore::new();
        store
            .expect_fetch()
            .withf(|key: &str| key == "uploads/2023/lunch.png")
            .times(1)
            .returning(move |_| Ok(photo.clone()));

        let detector = Arc::new(ScriptedDetector::new(vec![1]));
        let app = create_app(AppState::new(Arc::new(store), detector.clone()));

        let (status, body) = send(app, post_detect(r#"{"photo": "uploads/2023/lunch.png"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"labels": ["banana"]}));
    }

    /// Test 5: Concurrent requests are served independently
    #[tokio::test]
    async fn test_concurrent_requests() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0, 2]));
        let app = app_with(&bucket, &detector);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                send(app, post_detect(r#"{"photo": "meal.jpg"}"#)).await
            }));
        }

        for handle in handles {
            let (status, body) = handle.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"labels": ["apple", "rice"]}));
        }

        assert_eq!(bucket.fetch_count().await, 8);
        assert_eq!(detector.calls(), 8);
    }
}

#[cfg(test)]
mod detect_validation_tests {
    use super::*;

    /// Test 6: Missing photo yields the field map and touches nothing
    #[tokio::test]
    async fn test_missing_photo() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) = send(app_with(&bucket, &detector), post_detect("{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            json!({"photo": ["Missing data for required field."]})
        );
        assert_eq!(body["code"], "validation_error");
        assert_eq!(bucket.fetch_count().await, 0);
        assert_eq!(detector.calls(), 0);
    }

    /// Test 7: Non-string photo is rejected
    #[tokio::test]
    async fn test_photo_not_a_string() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) =
            send(app_with(&bucket, &detector), post_detect(r#"{"photo": 42}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!({"photo": ["Not a valid string."]}));
        assert_eq!(bucket.fetch_count().await, 0);
    }

    /// Test 8: Null and empty photo are rejected
    #[tokio::test]
    async fn test_photo_null_or_empty() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) =
            send(app_with(&bucket, &detector), post_detect(r#"{"photo": null}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!({"photo": ["Field may not be null."]}));

        let (status, body) =
            send(app_with(&bucket, &detector), post_detect(r#"{"photo": ""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]["photo"].is_array());

        assert_eq!(bucket.fetch_count().await, 0);
    }

    /// Test 9: Extra fields are reported alongside photo problems
    #[tokio::test]
    async fn test_unknown_fields_reported() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"image": "meal.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            json!({
                "photo": ["Missing data for required field."],
                "image": ["Unknown field."]
            })
        );
    }

    /// Test 10: Body that is not JSON at all
    #[tokio::test]
    async fn test_invalid_json() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) =
            send(app_with(&bucket, &detector), post_detect("photo=meal.jpg")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_json");
        assert_eq!(bucket.fetch_count().await, 0);
    }

    /// Test 11: JSON array instead of an object
    #[tokio::test]
    async fn test_body_not_an_object() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) =
            send(app_with(&bucket, &detector), post_detect(r#"["meal.jpg"]"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!({"_schema": ["Invalid input type."]}));
    }

    /// Test 12: Only POST is routed
    #[tokio::test]
    async fn test_get_not_allowed() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let request = Request::builder()
            .method(Method::GET)
            .uri("/detect")
            .body(Body::empty())
            .unwrap();
        let response = app_with(&bucket, &detector).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(bucket.fetch_count().await, 0);
        assert_eq!(detector.calls(), 0);
    }
}

#[cfg(test)]
mod detect_failure_tests {
    use super::*;

    /// Test 13: Key with no object behind it
    #[tokio::test]
    async fn test_object_not_found() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "missing.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "object_not_found");
        assert_eq!(detector.calls(), 0);
    }

    /// Test 14: Traversal keys never resolve to an object
    #[tokio::test]
    async fn test_traversal_key_not_found() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "../secrets.json"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "object_not_found");
    }

    /// Test 15: Bucket unreachable
    #[tokio::test]
    async fn test_storage_failure() {
        let bucket = bucket_with_photo().await;
        bucket
            .inject_error(StorageError::NetworkError("connection reset".to_string()))
            .await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "meal.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "storage_error");
        assert_eq!(detector.calls(), 0);
    }

    /// Test 16: Object exists but is not an image
    #[tokio::test]
    async fn test_object_not_an_image() {
        let bucket = MockBucket::new();
        bucket
            .insert("notes.txt", b"two eggs and toast".to_vec())
            .await;
        let detector = Arc::new(ScriptedDetector::new(vec![0]));

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "notes.txt"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_image");
        assert_eq!(detector.calls(), 0);
    }

    /// Test 17: Inference error surfaces as 500
    #[tokio::test]
    async fn test_inference_failure() {
        let bucket = bucket_with_photo().await;
        let detector = Arc::new(ScriptedDetector::failing());

        let (status, body) = send(
            app_with(&bucket, &detector),
            post_detect(r#"{"photo": "meal.jpg"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "inference_failed");
        assert_eq!(detector.calls(), 1);
    }

    /// Test 18: A failure does not poison later requests
    #[tokio::test]
    async fn test_recovers_after_storage_failure() {
        let bucket = bucket_with_photo().await;
        bucket
            .inject_error(StorageError::ServerError("503".to_string()))
            .await;
        let detector = Arc::new(ScriptedDetector::new(vec![1]));
        let app = app_with(&bucket, &detector);

        let (status, _) = send(app.clone(), post_detect(r#"{"photo": "meal.jpg"}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = send(app, post_detect(r#"{"photo": "meal.jpg"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"labels": ["banana"]}));
    }
}
