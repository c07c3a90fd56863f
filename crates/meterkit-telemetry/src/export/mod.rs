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

//! Pushing registry contents to an external backend.
//!
//! A publish turns a registry snapshot into flat [`DataPoint`]s, splits them
//! into batches no larger than the backend accepts, and hands each batch to a
//! [`MetricsSink`]. Batches are independent: a failed batch is reported in the
//! [`PublishReport`] and never stops the others.

pub mod config;
pub mod exporter;
pub mod sink;

pub use config::{CloudWatchConfig, StepConfig, StepRegistryConfig, MAX_BATCH_SIZE};
pub use exporter::PushExporter;
pub use sink::{InMemorySink, JsonLinesSink, LogSink, MetricsSink};

use meterkit_core::{MeterSnapshot, MetricsError, MetricsResult, Statistic, Tags};
use serde::Serialize;
use std::time::Duration;

/// One exported value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    /// The backend namespace the point is published under.
    pub namespace: String,
    /// The meter name.
    pub name: String,
    /// The meter tags.
    pub tags: Tags,
    /// Which statistic of the meter this is.
    pub statistic: Statistic,
    /// The meter's base unit, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// The sampled value.
    pub value: f64,
    /// Wall-clock time of the publish, in milliseconds since the epoch.
    pub timestamp: u64,
}

/// Flattens snapshots into data points. Non-finite values are dropped since
/// no backend accepts them.
pub fn to_data_points(
    snapshots: &[MeterSnapshot],
    namespace: &str,
    timestamp: u64,
) -> Vec<DataPoint> {
    snapshots
        .iter()
        .flat_map(|snapshot| {
            snapshot
                .measurements
                .iter()
                .filter(|m| m.value.is_finite())
                .map(move |m| DataPoint {
                    namespace: namespace.to_string(),
                    name: snapshot.id.name.clone(),
                    tags: snapshot.id.tags.clone(),
                    statistic: m.statistic,
                    unit: snapshot.metadata.base_unit.clone(),
                    value: m.value,
                    timestamp,
                })
        })
        .collect()
}

/// Splits `items` into consecutive chunks of at most `max` items, preserving
/// order. Only the last chunk may be smaller. A `max` of zero is read as one.
pub fn partition<T>(items: Vec<T>, max: usize) -> Vec<Vec<T>> {
    let max = max.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(max));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        batches.push(items.by_ref().take(max).collect());
    }
    batches
}

/// The result of publishing one batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Position of the batch in the publish.
    pub index: usize,
    /// Number of points in the batch.
    pub size: usize,
    /// What the sink returned.
    pub result: MetricsResult<()>,
}

/// Per-batch outcomes of one publish.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// One entry per batch, in submission order.
    pub outcomes: Vec<BatchOutcome>,
}

impl PublishReport {
    /// Number of batches the sink accepted.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of batches that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Number of points in accepted batches.
    pub fn points_published(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.size)
            .sum()
    }

    /// Returns `true` when every batch was accepted.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// The errors of the failed batches, with their batch index.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &MetricsError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.index, e)))
    }
}

/// Submits every batch to `sink`, each with its own `timeout`.
pub fn publish_batches(
    sink: &dyn MetricsSink,
    batches: Vec<Vec<DataPoint>>,
    timeout: Duration,
) -> PublishReport {
    let outcomes = batches
        .into_iter()
        .enumerate()
        .map(|(index, batch)| {
            let result = sink.publish(&batch, timeout);
            if let Err(e) = &result {
                log::error!(
                    "Failed to publish batch {} ({} points) to {}: {}",
                    index,
                    batch.len(),
                    sink.name(),
                    e
                );
            }
            BatchOutcome {
                index,
                size: batch.len(),
                result,
            }
        })
        .collect();
    PublishReport { outcomes }
}
