// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use nutriscan_detector::{
    api::{start_server, AppState},
    config::{DetectorConfig, StorageBackend},
    storage::{GcsBucket, LocalBucket, ObjectStore},
    vision::{ObjectDetector, YoloDetectionModel},
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting {}...\n", nutriscan_detector::version::get_version_string());
    println!("📦 BUILD VERSION: {}", nutriscan_detector::version::VERSION);
    println!("📅 Build Date: {}", nutriscan_detector::version::BUILD_DATE);
    println!();

    let config = DetectorConfig::parse();
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let store: Arc<dyn ObjectStore> = match config.storage_backend {
        StorageBackend::Gcs => Arc::new(
            GcsBucket::new(config.gcs_client_config())
                .context("Failed to create GCS bucket client")?,
        ),
        StorageBackend::Local => {
            let root = config
                .local_root
                .clone()
                .ok_or_else(|| anyhow!("LOCAL_STORAGE_ROOT is not set"))?;
            Arc::new(LocalBucket::new(root))
        }
    };
    println!("🪣 Photo storage: {}", store.describe());

    println!("🧠 Loading detection model from {}...", config.model_path.display());
    let model = YoloDetectionModel::new(config.detection_model_config())
        .await
        .with_context(|| {
            format!(
                "Failed to load detection model from {}",
                config.model_path.display()
            )
        })?;
    println!(
        "✅ Detection model loaded: {} ({} classes)",
        model.name(),
        model.labels().len()
    );

    let detector: Arc<dyn ObjectDetector> = Arc::new(model);
    let state = AppState::new(store, detector);
    let addr = config.listen_addr();

    let separator = "=".repeat(60);
    println!("\n{}", separator);
    println!("🎉 NutriScan Detector is running!");
    println!("{}", separator);
    println!("  Health:       http://{}/health", addr);
    println!("  Detect:       POST http://{}/detect", addr);
    println!("\nTest with curl:");
    println!("  curl -X POST http://{}/detect \\", addr);
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"photo\": \"uploads/meal.jpg\"}}'");
    println!("\nPress Ctrl+C to shutdown...");
    println!("{}\n", separator);

    start_server(addr, state).await?;

    println!("👋 Goodbye!");
    Ok(())
}
