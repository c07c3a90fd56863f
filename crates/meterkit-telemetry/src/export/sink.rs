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

//! Destinations for published batches.

use meterkit_core::{MetricsError, MetricsResult};
use std::collections::HashSet;
use std::fmt::Debug;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::DataPoint;
use crate::instruments::lock;

/// A backend accepting batches of data points.
pub trait MetricsSink: Send + Sync + Debug {
    /// A short name used in logs and errors.
    fn name(&self) -> &str;

    /// Publishes one batch. Implementations must give up after `timeout`
    /// and report [`MetricsError::Timeout`].
    fn publish(&self, batch: &[DataPoint], timeout: Duration) -> MetricsResult<()>;
}

/// Keeps published batches in memory.
///
/// Failures can be scripted by call index (the n-th `publish` call on this
/// sink, counting from zero) and a simulated latency is compared against the
/// caller's timeout.
#[derive(Debug, Default)]
pub struct InMemorySink {
    published: Mutex<Vec<Vec<DataPoint>>>,
    calls: AtomicUsize,
    failing: HashSet<usize>,
    latency: Option<Duration>,
}

impl InMemorySink {
    /// A sink accepting everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the calls with the given indices.
    pub fn failing_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(calls);
        self
    }

    /// Pretends every publish takes `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The accepted batches, in order.
    pub fn batches(&self) -> Vec<Vec<DataPoint>> {
        lock(&self.published).clone()
    }

    /// Every accepted point, in order.
    pub fn points(&self) -> Vec<DataPoint> {
        lock(&self.published).iter().flatten().cloned().collect()
    }

    /// Number of `publish` calls, accepted or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Forgets accepted batches.
    pub fn clear(&self) {
        lock(&self.published).clear();
    }
}

impl MetricsSink for InMemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn publish(&self, batch: &[DataPoint], timeout: Duration) -> MetricsResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&call) {
            return Err(MetricsError::PublishFailed {
                sink: self.name().to_string(),
                reason: format!("call {call} rejected"),
            });
        }
        if self.latency.is_some_and(|latency| latency > timeout) {
            return Err(MetricsError::Timeout(timeout));
        }
        lock(&self.published).push(batch.to_vec());
        Ok(())
    }
}

/// Writes each batch as one line of JSON.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W> Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> MetricsSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        "json-lines"
    }

    /// Local writes are not interruptible, so `timeout` is not enforced.
    fn publish(&self, batch: &[DataPoint], _timeout: Duration) -> MetricsResult<()> {
        let line =
            serde_json::to_string(batch).map_err(|e| MetricsError::Encoding(e.to_string()))?;
        let mut writer = lock(&self.writer);
        writeln!(writer, "{line}")
            .and_then(|_| writer.flush())
            .map_err(|e| MetricsError::PublishFailed {
                sink: self.name().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Writes every point to the `log` facade.
#[derive(Debug, Clone)]
pub struct LogSink {
    level: log::Level,
}

impl LogSink {
    /// Logs points at `level`.
    pub fn new(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(log::Level::Info)
    }
}

impl MetricsSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&self, batch: &[DataPoint], _timeout: Duration) -> MetricsResult<()> {
        for point in batch {
            let tags = point
                .tags
                .iter()
                .map(|t| format!("{}={}", t.key, t.value))
                .collect::<Vec<_>>()
                .join(",");
            log::log!(
                self.level,
                "{}/{}[{}] {}={}{}",
                point.namespace,
                point.name,
                tags,
                point.statistic.tag_value(),
                point.value,
                point
                    .unit
                    .as_deref()
                    .map(|u| format!(" {u}"))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}
