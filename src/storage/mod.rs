// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod bucket;
pub mod gcs_client;

pub use bucket::{validate_key, LocalBucket, MockBucket, ObjectStore, StorageError};
pub use gcs_client::{GcsBucket, GcsClientConfig, DEFAULT_GCS_ENDPOINT};
