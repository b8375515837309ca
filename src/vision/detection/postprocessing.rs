// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding of raw YOLO output tensors into detections

use anyhow::{bail, Result};
use ndarray::{ArrayViewD, Axis, Ix2};

use super::preprocessing::{LetterboxInfo, DETECTION_INPUT_SIZE};
use super::{BoundingBox, Detection};

/// Thresholds applied after inference
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    /// Square model input size
    pub input_size: u32,
    /// Minimum class score kept (0.0-1.0)
    pub confidence_threshold: f32,
    /// IoU above which same-class boxes are suppressed (0.0-1.0)
    pub iou_threshold: f32,
    /// Upper bound on detections returned per image
    pub max_detections: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            input_size: DETECTION_INPUT_SIZE,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Turn the model output into detections in original image coordinates,
/// ordered by descending confidence. `num_classes` is the size of the
/// model's label table and selects the attribute axis.
pub fn postprocess(
    output: ArrayViewD<f32>,
    params: &DetectionParams,
    num_classes: usize,
    letterbox: &LetterboxInfo,
) -> Result<Vec<Detection>> {
    let candidates = decode_predictions(output, num_classes, params.confidence_threshold)?;
    let mut detections = non_max_suppression(candidates, params.iou_threshold);
    detections.truncate(params.max_detections);

    for detection in &mut detections {
        detection.bbox = map_box(&detection.bbox, letterbox);
    }

    Ok(detections)
}

/// Decode a `[1, 4 + nc, N]` (or transposed `[1, N, 4 + nc]`) tensor.
///
/// Each prediction is `cx, cy, w, h` in model input space followed by one
/// score per class. The best class is kept when its score is strictly above
/// `threshold`. The attribute axis is the one of length `4 + num_classes`;
/// when that does not settle it, the shorter axis is taken.
pub fn decode_predictions(
    output: ArrayViewD<f32>,
    num_classes: usize,
    threshold: f32,
) -> Result<Vec<Detection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        bail!("Unexpected detection output shape: {:?}, expected [1, C, N]", shape);
    }

    let predictions = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()?;

    // Normalise to [N, C]. Without a matching class count, exports keep
    // attributes on the shorter axis.
    let expected = 4 + num_classes;
    let transposed = if num_classes > 0 && shape[1] == expected {
        false
    } else if num_classes > 0 && shape[2] == expected {
        true
    } else {
        shape[1] > shape[2]
    };
    let predictions = if !transposed {
        predictions.reversed_axes()
    } else {
        predictions
    };

    let attributes = predictions.shape()[1];
    if attributes <= 4 {
        bail!("Detection output has no class scores: {:?}", shape);
    }

    let mut detections = Vec::new();
    for row in predictions.outer_iter() {
        let (class_id, confidence) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (idx, score)| {
                if score > best.1 {
                    (idx, score)
                } else {
                    best
                }
            });

        if confidence <= threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        detections.push(Detection {
            bbox: BoundingBox {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                width: w,
                height: h,
            },
            confidence,
            class_id,
        });
    }

    Ok(detections)
}

/// Class-aware non-maximum suppression
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// Intersection over union of two boxes
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn map_box(bbox: &BoundingBox, letterbox: &LetterboxInfo) -> BoundingBox {
    let (x1, y1) = letterbox.map_to_original(bbox.x, bbox.y);
    let (x2, y2) = letterbox.map_to_original(bbox.x + bbox.width, bbox.y + bbox.height);
    BoundingBox {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    }
}
