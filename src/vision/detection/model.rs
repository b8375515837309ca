// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLO object detection model running on ONNX Runtime

use anyhow::{anyhow, bail, Context, Result};
use image::DynamicImage;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Value, ValueType};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

use super::labels::{LabelMap, NAMES_METADATA_KEY};
use super::postprocessing::{postprocess, DetectionParams};
use super::preprocessing::preprocess_for_detection;
use super::{Detection, ObjectDetector};

/// Where and how to load the detection weights
#[derive(Debug, Clone)]
pub struct DetectionModelConfig {
    /// Path to the ONNX weights file
    pub model_path: PathBuf,
    /// Optional labels file overriding the names embedded in the model
    pub labels_path: Option<PathBuf>,
    /// Expected SHA-256 of the weights (hex)
    pub expected_sha256: Option<String>,
    pub params: DetectionParams,
}

impl Default for DetectionModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./model.onnx"),
            labels_path: None,
            expected_sha256: None,
            params: DetectionParams::default(),
        }
    }
}

/// Pretrained YOLO detector
///
/// The session is loaded once at startup and shared by every request.
/// Runs on CPU; calls to `detect` are serialised on the session lock.
#[derive(Clone)]
pub struct YoloDetectionModel {
    /// ONNX Runtime session (thread-safe)
    session: Arc<Mutex<Session>>,
    input_name: String,
    name: String,
    labels: LabelMap,
    params: DetectionParams,
}

impl std::fmt::Debug for YoloDetectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetectionModel")
            .field("name", &self.name)
            .field("input_name", &self.input_name)
            .field("classes", &self.labels.len())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl YoloDetectionModel {
    /// Load the detection model
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found or its checksum does not match
    /// - ONNX Runtime initialization fails
    /// - No class names are available (neither embedded nor a labels file)
    pub async fn new(config: DetectionModelConfig) -> Result<Self> {
        let model_path = config.model_path.as_path();

        if !model_path.exists() {
            bail!("Detection model not found: {}", model_path.display());
        }

        if let Some(expected) = &config.expected_sha256 {
            verify_model_checksum(model_path, expected)?;
            info!("Model checksum verified for {}", model_path.display());
        }

        info!("Loading detection model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load detection model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        let mut params = config.params.clone();
        if let Some(size) = session.inputs.first().and_then(|input| square_input_size(&input.input_type)) {
            if size != params.input_size {
                debug!(
                    "Model declares {}x{} input, overriding configured {}",
                    size, size, params.input_size
                );
                params.input_size = size;
            }
        }

        let embedded_names = {
            let metadata = session
                .metadata()
                .context("Failed to read model metadata")?;
            let names = metadata
                .custom(NAMES_METADATA_KEY)
                .context("Failed to read class names from model metadata")?;
            names
        };

        let labels = match (&config.labels_path, embedded_names) {
            (Some(path), _) => LabelMap::from_file(path)?,
            (None, Some(raw)) => LabelMap::from_metadata(&raw)
                .context("Failed to parse class names embedded in the model")?,
            (None, None) => bail!(
                "Model {} carries no class names; provide a labels file",
                model_path.display()
            ),
        };

        let name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());

        info!(
            "✅ Detection model '{}' loaded: {} classes, {}x{} input (CPU-only)",
            name,
            labels.len(),
            params.input_size,
            params.input_size
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            name,
            labels,
            params,
        })
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }
}

impl ObjectDetector for YoloDetectionModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let start = Instant::now();
        let (input, letterbox) = preprocess_for_detection(image, self.params.input_size);

        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Detection session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Detection inference failed")?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        let detections = postprocess(
            output_tensor.view(),
            &self.params,
            self.labels.len(),
            &letterbox,
        )?;

        debug!(
            "Detected {} objects in {}ms",
            detections.len(),
            start.elapsed().as_millis()
        );

        Ok(detections)
    }
}

/// Square spatial size of an NCHW image input, when fixed in the graph
fn square_input_size(input_type: &ValueType) -> Option<u32> {
    match input_type {
        ValueType::Tensor { shape, .. } => {
            let height = shape.get(2).copied()?;
            let width = shape.get(3).copied()?;
            (height > 0 && height == width).then_some(height as u32)
        }
        _ => None,
    }
}

/// Compare the SHA-256 of the weights file against `expected` (hex, case-insensitive)
pub fn verify_model_checksum(path: &Path, expected: &str) -> Result<()> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open model {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read model {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        bail!(
            "Model checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected.trim(),
            actual
        );
    }

    Ok(())
}
