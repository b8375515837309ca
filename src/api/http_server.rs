// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::detect::detect_handler;
use crate::storage::ObjectStore;
use crate::vision::ObjectDetector;

/// Process-wide collaborators, built once at startup and never mutated
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub detector: Arc<dyn ObjectDetector>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            store,
            detector,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub labels: usize,
    pub storage: String,
    pub uptime_seconds: i64,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/detect", post(detect_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until Ctrl+C is received
pub async fn start_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("⏹️  Shutting down...");
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version::VERSION.to_string(),
        model: state.detector.name().to_string(),
        labels: state.detector.labels().len(),
        storage: state.store.describe(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}
