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

//! Periodic publishing of a registry to a sink.

use meterkit_core::{Clock, MetricsResult};
use std::sync::Arc;

use super::config::StepRegistryConfig;
use super::sink::MetricsSink;
use super::{partition, publish_batches, to_data_points, PublishReport};
use crate::registry::MeterRegistry;

/// The values a publish actually uses, re-validated whenever they change.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EffectiveSettings {
    namespace: String,
    batch_size: usize,
}

/// Publishes a registry to a sink once per configured step.
///
/// Drive it by calling [`PushExporter::tick`] regularly (e.g. from a
/// scheduler thread), or call [`PushExporter::publish`] directly.
pub struct PushExporter {
    registry: Arc<dyn MeterRegistry>,
    config: Arc<dyn StepRegistryConfig>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    last_publish: Option<u64>,
    last_settings: Option<EffectiveSettings>,
}

impl std::fmt::Debug for PushExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushExporter")
            .field("prefix", &self.config.prefix())
            .field("sink", &self.sink.name())
            .field("last_publish", &self.last_publish)
            .finish_non_exhaustive()
    }
}

impl PushExporter {
    /// Creates an exporter that tolerates an invalid configuration: each
    /// failure is logged and publishing falls back to clamped or default
    /// values.
    pub fn new(
        registry: Arc<dyn MeterRegistry>,
        config: Arc<dyn StepRegistryConfig>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        for failure in config.validate().failures() {
            log::warn!(
                "Invalid {} exporter configuration, continuing with defaults: {}",
                config.prefix(),
                failure
            );
        }
        Self::build(registry, config, sink)
    }

    /// Creates an exporter, refusing an invalid configuration.
    pub fn try_new(
        registry: Arc<dyn MeterRegistry>,
        config: Arc<dyn StepRegistryConfig>,
        sink: Arc<dyn MetricsSink>,
    ) -> MetricsResult<Self> {
        config.validate().or_fail()?;
        Ok(Self::build(registry, config, sink))
    }

    fn build(
        registry: Arc<dyn MeterRegistry>,
        config: Arc<dyn StepRegistryConfig>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let clock = registry.clock();
        log::info!(
            "Publishing to {} every {:?} (enabled: {})",
            sink.name(),
            config.step(),
            config.enabled()
        );
        Self {
            registry,
            config,
            sink,
            clock,
            last_publish: None,
            last_settings: None,
        }
    }

    /// The batch size publishes use: the configured size, capped by the
    /// backend ceiling, and at least one.
    pub fn effective_batch_size(&self) -> usize {
        let configured = self.config.batch_size();
        self.config
            .batch_size_ceiling()
            .map_or(configured, |ceiling| configured.min(ceiling))
            .max(1)
    }

    fn effective_settings(&self) -> EffectiveSettings {
        EffectiveSettings {
            namespace: self.config.namespace().unwrap_or_default(),
            batch_size: self.effective_batch_size(),
        }
    }

    fn revalidate_if_changed(&mut self, settings: &EffectiveSettings) {
        if self.last_settings.as_ref() == Some(settings) {
            return;
        }
        let result = self.config.validate();
        if result.is_valid() {
            log::debug!(
                "Publishing under namespace '{}' in batches of {}",
                settings.namespace,
                settings.batch_size
            );
        } else {
            for failure in result.failures() {
                log::warn!("Publishing despite invalid configuration: {}", failure);
            }
        }
        self.last_settings = Some(settings.clone());
    }

    /// Snapshots the registry and publishes every point, batch by batch.
    pub fn publish(&mut self) -> PublishReport {
        let settings = self.effective_settings();
        self.revalidate_if_changed(&settings);

        let snapshots = self.registry.snapshot();
        let points = to_data_points(&snapshots, &settings.namespace, self.clock.wall_time());
        let total = points.len();
        let batches = partition(points, settings.batch_size);
        let report = publish_batches(self.sink.as_ref(), batches, self.config.read_timeout());

        self.last_publish = Some(self.clock.monotonic_time());
        if report.is_success() {
            log::info!(
                "Published {} points in {} batches to {}",
                total,
                report.outcomes.len(),
                self.sink.name()
            );
        } else {
            log::info!(
                "Published {} of {} points to {}; {} of {} batches failed",
                report.points_published(),
                total,
                self.sink.name(),
                report.failed(),
                report.outcomes.len()
            );
        }
        report
    }

    /// Publishes if enabled and at least one step has elapsed since the
    /// last publish (or nothing was published yet).
    pub fn tick(&mut self) -> Option<PublishReport> {
        if !self.config.enabled() {
            log::trace!("Exporter disabled, skipping publish");
            return None;
        }
        let now = self.clock.monotonic_time();
        let step = u64::try_from(self.config.step().as_nanos()).unwrap_or(u64::MAX);
        let due = self
            .last_publish
            .map_or(true, |last| now.saturating_sub(last) >= step);
        due.then(|| self.publish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{CloudWatchConfig, InMemorySink, StepConfig, MAX_BATCH_SIZE};
    use crate::registry::{MeterRegistryExt, SimpleMeterRegistry};
    use meterkit_core::{ConfigSource, MetricsError, MockClock, Statistic, Tags};
    use std::collections::HashMap;
    use std::time::Duration;

    struct Cloud {
        namespace: Option<String>,
        batch_size: Option<usize>,
    }

    impl ConfigSource for Cloud {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
    }

    impl CloudWatchConfig for Cloud {
        fn namespace(&self) -> Option<String> {
            self.namespace.clone()
        }

        fn batch_size(&self) -> usize {
            self.batch_size.unwrap_or(MAX_BATCH_SIZE)
        }
    }

    fn setup(meters: usize) -> (Arc<MockClock>, Arc<SimpleMeterRegistry>) {
        let clock = Arc::new(MockClock::new());
        let registry = Arc::new(SimpleMeterRegistry::cumulative(clock.clone()));
        for i in 0..meters {
            registry
                .counter(&format!("meter.{i:03}"), Tags::empty())
                .increment();
        }
        (clock, registry)
    }

    #[test]
    fn test_overridden_batch_size_is_clamped_when_publishing() {
        let (_, registry) = setup(45);
        let sink = Arc::new(InMemorySink::new());
        let config = Arc::new(Cloud {
            namespace: Some("app".into()),
            batch_size: Some(40),
        });
        let mut exporter = PushExporter::new(registry, config, sink.clone());

        assert_eq!(exporter.effective_batch_size(), MAX_BATCH_SIZE);
        let report = exporter.publish();
        let sizes: Vec<_> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert!(report.is_success());
    }

    #[test]
    fn test_try_new_rejects_missing_namespace() {
        let (_, registry) = setup(0);
        let config = Arc::new(Cloud {
            namespace: None,
            batch_size: None,
        });
        let err = PushExporter::try_new(registry, config, Arc::new(InMemorySink::new()))
            .unwrap_err();
        match err {
            MetricsError::InvalidConfiguration(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].property(), "cloudwatch.namespace");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_points_carry_namespace_and_timestamp() {
        let (clock, registry) = setup(1);
        clock.add(Duration::from_secs(3));
        let sink = Arc::new(InMemorySink::new());
        let config = Arc::new(Cloud {
            namespace: Some("svc".into()),
            batch_size: None,
        });
        let mut exporter = PushExporter::new(registry, config, sink.clone());

        exporter.publish();
        let points = sink.points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].namespace, "svc");
        assert_eq!(points[0].name, "meter.000");
        assert_eq!(points[0].statistic, Statistic::Count);
        assert_eq!(points[0].timestamp, 3_000);
    }

    #[test]
    fn test_tick_publishes_once_per_step() {
        let (clock, registry) = setup(1);
        let sink = Arc::new(InMemorySink::new());
        let source: HashMap<String, String> = [("push.step", "10s"), ("push.namespace", "ns")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut exporter = PushExporter::try_new(
            registry,
            Arc::new(StepConfig::new("push", source)),
            sink.clone(),
        )
        .unwrap();

        assert!(exporter.tick().is_some());
        clock.add(Duration::from_secs(5));
        assert!(exporter.tick().is_none());
        clock.add(Duration::from_secs(5));
        assert!(exporter.tick().is_some());
        assert_eq!(sink.calls(), 2);
    }

    #[test]
    fn test_tick_with_huge_step_publishes_only_once() {
        let (clock, registry) = setup(1);
        let sink = Arc::new(InMemorySink::new());
        // 2^64 s, far beyond what fits in u64 nanoseconds.
        let source: HashMap<String, String> =
            [("push.step", "18446744073709551615s"), ("push.namespace", "ns")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        let mut exporter = PushExporter::new(
            registry,
            Arc::new(StepConfig::new("push", source)),
            sink.clone(),
        );

        assert!(exporter.tick().is_some());
        clock.add_seconds(86_400);
        assert!(exporter.tick().is_none());
        assert_eq!(sink.calls(), 1);
    }

    #[test]
    fn test_disabled_exporter_never_publishes() {
        let (_, registry) = setup(1);
        let sink = Arc::new(InMemorySink::new());
        let source: HashMap<String, String> = [("push.enabled", "false")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut exporter =
            PushExporter::new(registry, Arc::new(StepConfig::new("push", source)), sink.clone());

        assert!(exporter.tick().is_none());
        assert_eq!(sink.calls(), 0);
    }
}
