// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detection with a pretrained YOLO model
//!
//! Components:
//! - `labels` - Class index to name table from the model artifact
//! - `preprocessing` - Letterbox and tensor conversion
//! - `postprocessing` - Output decoding and NMS
//! - `model` - ONNX Runtime session wrapper

pub mod labels;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;

use anyhow::Result;
use image::DynamicImage;

pub use labels::LabelMap;
pub use model::{verify_model_checksum, DetectionModelConfig, YoloDetectionModel};
pub use postprocessing::DetectionParams;
pub use preprocessing::{LetterboxInfo, DETECTION_INPUT_SIZE};

/// Box in original image pixel coordinates (top-left origin)
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// A single detected object instance
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Class score (0.0-1.0)
    pub confidence: f32,
    /// Index into the model's label map
    pub class_id: usize,
}

/// A pretrained detector shared read-only across requests.
///
/// `detect` blocks for the duration of inference; callers on the async
/// runtime should move it onto the blocking pool.
pub trait ObjectDetector: Send + Sync {
    /// Model identifier reported by the health endpoint
    fn name(&self) -> &str;

    /// The model's fixed class-index -> name table
    fn labels(&self) -> &LabelMap;

    /// Run detection on a decoded image, one entry per detection box
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}
