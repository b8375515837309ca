// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection API endpoint module
//!
//! Provides POST /detect for labelling objects in bucket photos.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::detect_handler;
pub use request::{DetectionRequest, FieldErrors};
pub use response::DetectionResponse;
