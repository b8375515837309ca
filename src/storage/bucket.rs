// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

/// Read-only access to the bucket holding uploaded photos.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the raw bytes stored under `key`
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Human readable location, used in logs and the health endpoint
    fn describe(&self) -> String;
}

/// Reject keys that can never address an object in the bucket.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Empty key".to_string()));
    }

    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Key cannot start with /".to_string(),
        ));
    }

    if key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(
            "Path traversal not allowed".to_string(),
        ));
    }

    if key.split('/').any(|segment| segment == ".") {
        return Err(StorageError::InvalidKey(
            "Dot segments are not object names".to_string(),
        ));
    }

    Ok(())
}

/// In-memory bucket used by tests and local experiments
#[derive(Debug, Clone, Default)]
pub struct MockBucket {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    injected_error: Arc<Mutex<Option<StorageError>>>,
    fetch_count: Arc<Mutex<usize>>,
}

impl MockBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().await.insert(key.to_string(), data);
    }

    /// Make the next fetch fail with `error`
    pub async fn inject_error(&self, error: StorageError) {
        *self.injected_error.lock().await = Some(error);
    }

    pub async fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().await
    }
}

#[async_trait]
impl ObjectStore for MockBucket {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        *self.fetch_count.lock().await += 1;

        if let Some(error) = self.injected_error.lock().await.take() {
            return Err(error);
        }
        validate_key(key)?;

        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn describe(&self) -> String {
        "mock://memory".to_string()
    }
}

/// Bucket backed by a local directory, one file per object key
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalBucket {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;

        let path = self.root.join(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::AccessDenied(key.to_string()))
            }
            Err(e) => Err(StorageError::ServerError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
