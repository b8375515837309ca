// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use super::detect::FieldErrors;
use crate::storage::StorageError;
use crate::vision::ImageError;

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// Either a plain message or, for validation failures, a field -> messages map
    pub message: serde_json::Value,
    /// Stable machine-readable error code
    pub code: String,
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("Validation failed for {}", .0.fields().join(", "))]
    Validation(FieldErrors),
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::Validation(_) => "validation_error",
            ApiError::ObjectNotFound(_) => "object_not_found",
            ApiError::Storage(_) => "storage_error",
            ApiError::InvalidImage(_) => "invalid_image",
            ApiError::Inference(_) => "inference_failed",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Inference(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            ApiError::Validation(errors) => errors.to_json(),
            ApiError::InvalidJson(msg) => serde_json::Value::String(msg.clone()),
            other => serde_json::Value::String(other.to_string()),
        };

        ErrorResponse {
            message,
            code: self.code().to_string(),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) | StorageError::InvalidKey(key) => {
                ApiError::ObjectNotFound(key)
            }
            other => ApiError::Storage(other.to_string()),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        ApiError::InvalidImage(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        (status, Json(self.to_response())).into_response()
    }
}
