// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for bucket photos
//!
//! This module provides:
//! - Image decoding from raw object bytes
//! - Object detection via a pretrained YOLO model (ONNX, CPU only)

pub mod detection;
pub mod image_utils;

pub use detection::{
    BoundingBox, Detection, DetectionModelConfig, DetectionParams, LabelMap, ObjectDetector,
    YoloDetectionModel,
};
pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
