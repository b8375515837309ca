// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod storage;
pub mod version;
pub mod vision;

pub use api::{create_app, start_server, ApiError, AppState};
pub use config::{DetectorConfig, StorageBackend};
pub use storage::{GcsBucket, LocalBucket, MockBucket, ObjectStore, StorageError};
pub use vision::{Detection, LabelMap, ObjectDetector, YoloDetectionModel};
