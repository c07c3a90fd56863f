// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors surfaced by configuration and export.
//!
//! Recording a measurement never produces one of these: the update path is
//! infallible. Only validation (when a caller asks for fail-fast behaviour)
//! and publishing report errors.

use std::fmt::Display;
use std::time::Duration;

use crate::config::Validated;

/// A specialized `Result` type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error that can occur within the metrics system.
#[derive(Debug, Clone)]
pub enum MetricsError {
    /// One or more configuration properties failed validation.
    InvalidConfiguration(Vec<Validated>),
    /// A sink did not finish publishing a batch within its deadline.
    Timeout(Duration),
    /// A sink rejected a batch or failed to transmit it.
    PublishFailed {
        /// The sink that failed.
        sink: String,
        /// Why it failed.
        reason: String,
    },
    /// Encoding a batch for the wire failed.
    Encoding(String),
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::InvalidConfiguration(failures) => {
                let details = failures
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "Invalid configuration: {details}")
            }
            MetricsError::Timeout(deadline) => {
                write!(f, "Publish timed out after {deadline:?}")
            }
            MetricsError::PublishFailed { sink, reason } => {
                write!(f, "Publish to {sink} failed: {reason}")
            }
            MetricsError::Encoding(msg) => write!(f, "Encoding error: {msg}"),
        }
    }
}

impl std::error::Error for MetricsError {}
