// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection endpoint handler

use axum::{body::Bytes, extract::State, Json};
use tracing::{debug, info};

use super::request::DetectionRequest;
use super::response::DetectionResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::image_utils::{decode_image_bytes, format_to_extension};

/// POST /detect - Detect objects in a photo stored in the bucket
///
/// # Request
/// - `photo`: Key of the image object in the bucket (required, non-empty string)
///
/// # Response
/// - `labels`: One class label per detected object, in detection order
///
/// # Errors
/// - 400 Bad Request: Body is not JSON or fails schema validation
/// - 404 Not Found: No object under the given key
/// - 422 Unprocessable Entity: Object is not a decodable image
/// - 502 Bad Gateway: Bucket could not be reached
/// - 500 Internal Server Error: Inference failed
/// - 503 Service Unavailable: Inference cancelled during shutdown
pub async fn detect_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DetectionResponse>, ApiError> {
    // 1. Parse and validate the body
    let value: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    let request = DetectionRequest::from_json(&value)?;

    debug!("Detection request received for photo: {}", request.photo);

    // 2. Fetch the object from the bucket
    let bytes = state.store.fetch(&request.photo).await?;

    // 3. Decode
    let (image, image_info) = decode_image_bytes(&bytes)?;
    drop(bytes);

    debug!(
        "Decoded {} image: {}x{}, {} bytes",
        format_to_extension(image_info.format),
        image_info.width,
        image_info.height,
        image_info.size_bytes
    );

    // 4. Run inference off the async runtime
    let detector = state.detector.clone();
    let detections = tokio::task::spawn_blocking(move || detector.detect(&image))
        .await
        .map_err(|e| {
            if e.is_cancelled() {
                ApiError::ServiceUnavailable("Server is shutting down".to_string())
            } else {
                ApiError::Internal(format!("Inference task failed: {}", e))
            }
        })?
        .map_err(|e| ApiError::Inference(e.to_string()))?;

    // 5. Map class indices to labels
    let response = DetectionResponse::from_detections(&detections, state.detector.labels());

    info!(
        "Detection complete for {}: {} objects",
        request.photo,
        response.labels.len()
    );

    Ok(Json(response))
}
