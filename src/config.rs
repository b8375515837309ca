// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process configuration from command-line flags and environment variables

use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::storage::{GcsClientConfig, DEFAULT_GCS_ENDPOINT};
use crate::vision::detection::{DetectionModelConfig, DetectionParams, DETECTION_INPUT_SIZE};

pub const DEFAULT_BUCKET: &str = "nutriscan-c23-ps198-assets";
pub const DEFAULT_PROJECT: &str = "nutriscan-c23-ps198";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Google Cloud Storage bucket
    Gcs,
    /// Directory on the local filesystem, keys resolve under `local_root`
    Local,
}

/// Photo detection service
#[derive(Parser, Debug, Clone)]
#[command(name = "nutriscan-detector")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Detects objects in bucket photos over HTTP", long_about = None)]
pub struct DetectorConfig {
    /// Address to bind
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Gcs)]
    pub storage_backend: StorageBackend,

    #[arg(long, env = "GCS_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    #[arg(long, env = "GCS_PROJECT", default_value = DEFAULT_PROJECT)]
    pub project: String,

    /// Override for emulators
    #[arg(long, env = "GCS_ENDPOINT", default_value = DEFAULT_GCS_ENDPOINT)]
    pub gcs_endpoint: String,

    /// OAuth2 bearer token for private buckets
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_access_token: Option<String>,

    /// Root directory for the local backend
    #[arg(long, env = "LOCAL_STORAGE_ROOT")]
    pub local_root: Option<PathBuf>,

    #[arg(long, env = "MODEL_PATH", default_value = "./model.onnx")]
    pub model_path: PathBuf,

    /// One class name per line; overrides names embedded in the model
    #[arg(long, env = "LABELS_PATH")]
    pub labels_path: Option<PathBuf>,

    /// Expected SHA-256 of the model file
    #[arg(long, env = "MODEL_SHA256")]
    pub model_sha256: Option<String>,

    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = 0.25)]
    pub confidence_threshold: f32,

    #[arg(long, env = "IOU_THRESHOLD", default_value_t = 0.7)]
    pub iou_threshold: f32,

    #[arg(long, env = "MAX_DETECTIONS", default_value_t = 300)]
    pub max_detections: usize,

    #[arg(long, env = "STORAGE_TIMEOUT_SECS", default_value_t = 30)]
    pub storage_timeout_secs: u64,
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "Confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "IoU threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.max_detections == 0 {
            return Err("Max detections must be greater than 0".to_string());
        }
        if self.storage_timeout_secs == 0 {
            return Err("Storage timeout must be greater than 0".to_string());
        }
        if self.storage_backend == StorageBackend::Local && self.local_root.is_none() {
            return Err("Local storage backend requires LOCAL_STORAGE_ROOT".to_string());
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            input_size: DETECTION_INPUT_SIZE,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }

    pub fn detection_model_config(&self) -> DetectionModelConfig {
        DetectionModelConfig {
            model_path: self.model_path.clone(),
            labels_path: self.labels_path.clone(),
            expected_sha256: self.model_sha256.clone(),
            params: self.detection_params(),
        }
    }

    pub fn gcs_client_config(&self) -> GcsClientConfig {
        GcsClientConfig {
            endpoint: self.gcs_endpoint.clone(),
            bucket: self.bucket.clone(),
            project: self.project.clone(),
            access_token: self.gcs_access_token.clone(),
            timeout_seconds: self.storage_timeout_secs,
        }
    }
}
