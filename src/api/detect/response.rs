// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection response types

use serde::{Deserialize, Serialize};

use crate::vision::{Detection, LabelMap};

/// Response from `POST /detect`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResponse {
    /// One label per detection box, in detection order (duplicates kept)
    pub labels: Vec<String>,
}

impl DetectionResponse {
    /// Name every detection with the model's label table
    pub fn from_detections(detections: &[Detection], labels: &LabelMap) -> Self {
        Self {
            labels: detections
                .iter()
                .map(|detection| labels.label_for(detection.class_id))
                .collect(),
        }
    }
}
