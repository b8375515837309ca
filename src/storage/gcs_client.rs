// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Google Cloud Storage bucket client
//!
//! Downloads objects through the JSON API media endpoint:
//! `GET {endpoint}/storage/v1/b/{bucket}/o/{object}?alt=media`

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::bucket::{validate_key, ObjectStore, StorageError};

/// Public Google Cloud Storage endpoint
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GcsClientConfig {
    /// API endpoint (overridable for emulators)
    pub endpoint: String,
    /// Bucket holding the photos
    pub bucket: String,
    /// Project owning the bucket
    pub project: String,
    /// OAuth2 bearer token; anonymous access when unset
    pub access_token: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug)]
pub struct GcsBucket {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    project: String,
    access_token: Option<String>,
}

impl GcsBucket {
    pub fn new(config: GcsClientConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;

        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            StorageError::ServerError(format!("Invalid endpoint {}: {}", config.endpoint, e))
        })?;

        Ok(Self {
            client,
            endpoint,
            bucket: config.bucket,
            project: config.project,
            access_token: config.access_token,
        })
    }

    /// Build the media download URL; the key becomes a single encoded segment.
    ///
    /// Authenticated requests name the project as `userProject` so it is
    /// billed for requester-pays buckets. Anonymous requests cannot be billed
    /// and omit it.
    pub fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::ServerError("Endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o"])
            .push(key);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if self.access_token.is_some() {
                query.append_pair("userProject", &self.project);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsBucket {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;

        let url = self.object_url(key)?;
        debug!("Downloading gs://{}/{}", self.bucket, key);

        let mut request_builder = self.client.get(url);
        if let Some(token) = &self.access_token {
            request_builder = request_builder.bearer_auth(token);
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let data = response
                .bytes()
                .await
                .map_err(|e| StorageError::NetworkError(e.to_string()))?;
            Ok(data.to_vec())
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(StorageError::NotFound(key.to_string()))
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Err(StorageError::AccessDenied(format!(
                "gs://{}/{} ({})",
                self.bucket, key, status
            )))
        } else {
            Err(StorageError::ServerError(format!(
                "Download failed: {}",
                status
            )))
        }
    }

    fn describe(&self) -> String {
        format!("gs://{} (project {})", self.bucket, self.project)
    }
}
