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

//! Fluent meter builders.
//!
//! A builder is a plain value: it can be cloned and committed against any
//! number of registries. Nothing is registered until `create` is called.
//!
//! ```ignore
//! let requests = CounterBuilder::new("http.requests")
//!     .tag("method", "GET")
//!     .description("Handled requests")
//!     .create(&registry);
//! ```

use meterkit_core::{
    Counter, DistributionSummary, Gauge, LongTaskTimer, MeterId, MeterMetadata, MeterType, Tags,
    Timer,
};
use std::sync::Arc;

use super::MeterRegistry;
use crate::instruments::weak_observation;

#[derive(Debug, Clone)]
struct Descriptor {
    name: String,
    tags: Tags,
    metadata: MeterMetadata,
}

impl Descriptor {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::empty(),
            metadata: MeterMetadata::default(),
        }
    }

    fn id(&self, meter_type: MeterType) -> MeterId {
        MeterId::new(self.name.clone(), meter_type).with_tags(self.tags.clone())
    }
}

macro_rules! descriptor_setters {
    () => {
        /// Adds a tag.
        pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.descriptor.tags = self.descriptor.tags.and(key, value);
            self
        }

        /// Adds several tags. Later keys win over earlier ones.
        pub fn tags(mut self, tags: impl Into<Tags>) -> Self {
            self.descriptor.tags = self.descriptor.tags.and_all(&tags.into());
            self
        }

        /// Sets the human-readable description.
        pub fn description(mut self, description: impl Into<String>) -> Self {
            self.descriptor.metadata.description = Some(description.into());
            self
        }

        /// Sets the unit of the recorded values.
        pub fn base_unit(mut self, unit: impl Into<String>) -> Self {
            self.descriptor.metadata.base_unit = Some(unit.into());
            self
        }
    };
}

/// Builds a [`Counter`].
#[derive(Debug, Clone)]
pub struct CounterBuilder {
    descriptor: Descriptor,
}

impl CounterBuilder {
    /// Starts a counter named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::new(name),
        }
    }

    descriptor_setters!();

    /// Finds or creates the counter in `registry`.
    pub fn create<R: MeterRegistry + ?Sized>(&self, registry: &R) -> Arc<dyn Counter> {
        registry.register_counter(
            self.descriptor.id(MeterType::Counter),
            self.descriptor.metadata.clone(),
        )
    }
}

/// Builds a [`Timer`].
#[derive(Debug, Clone)]
pub struct TimerBuilder {
    descriptor: Descriptor,
}

impl TimerBuilder {
    /// Starts a timer named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::new(name),
        }
    }

    descriptor_setters!();

    /// Finds or creates the timer in `registry`.
    pub fn create<R: MeterRegistry + ?Sized>(&self, registry: &R) -> Arc<dyn Timer> {
        registry.register_timer(
            self.descriptor.id(MeterType::Timer),
            self.descriptor.metadata.clone(),
        )
    }
}

/// Builds a [`DistributionSummary`].
#[derive(Debug, Clone)]
pub struct SummaryBuilder {
    descriptor: Descriptor,
}

impl SummaryBuilder {
    /// Starts a summary named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::new(name),
        }
    }

    descriptor_setters!();

    /// Finds or creates the summary in `registry`.
    pub fn create<R: MeterRegistry + ?Sized>(&self, registry: &R) -> Arc<dyn DistributionSummary> {
        registry.register_summary(
            self.descriptor.id(MeterType::DistributionSummary),
            self.descriptor.metadata.clone(),
        )
    }
}

/// Builds a [`LongTaskTimer`].
#[derive(Debug, Clone)]
pub struct LongTaskTimerBuilder {
    descriptor: Descriptor,
}

impl LongTaskTimerBuilder {
    /// Starts a long task timer named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::new(name),
        }
    }

    descriptor_setters!();

    /// Finds or creates the long task timer in `registry`.
    pub fn create<R: MeterRegistry + ?Sized>(&self, registry: &R) -> Arc<dyn LongTaskTimer> {
        registry.register_long_task_timer(
            self.descriptor.id(MeterType::LongTaskTimer),
            self.descriptor.metadata.clone(),
        )
    }
}

/// Builds a [`Gauge`] observing `T` through a weak reference.
pub struct GaugeBuilder<T> {
    descriptor: Descriptor,
    target: Arc<T>,
    value: Arc<dyn Fn(&T) -> f64 + Send + Sync>,
}

impl<T> Clone for GaugeBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            target: self.target.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> GaugeBuilder<T> {
    /// Starts a gauge named `name` reporting `value(target)`.
    pub fn new(
        name: impl Into<String>,
        target: &Arc<T>,
        value: impl Fn(&T) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor: Descriptor::new(name),
            target: target.clone(),
            value: Arc::new(value),
        }
    }

    descriptor_setters!();

    /// Finds or creates the gauge in `registry`. The builder's strong
    /// reference to the target does not outlive the builder itself.
    pub fn create<R: MeterRegistry + ?Sized>(&self, registry: &R) -> Arc<dyn Gauge> {
        let value = self.value.clone();
        registry.register_gauge(
            self.descriptor.id(MeterType::Gauge),
            self.descriptor.metadata.clone(),
            weak_observation(&self.target, move |target| value(target)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SimpleMeterRegistry;
    use meterkit_core::{Meter, MockClock};

    fn registry() -> SimpleMeterRegistry {
        SimpleMeterRegistry::cumulative(Arc::new(MockClock::new()))
    }

    #[test]
    fn test_builder_carries_metadata() {
        let registry = registry();
        let counter = CounterBuilder::new("http.requests")
            .tag("method", "GET")
            .tags([("status", "200"), ("method", "POST")])
            .description("Handled requests")
            .base_unit("requests")
            .create(&registry);
        counter.increment();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id.tags.get("method"), Some("POST"));
        assert_eq!(snapshot[0].id.tags.get("status"), Some("200"));
        assert_eq!(
            snapshot[0].metadata.description.as_deref(),
            Some("Handled requests")
        );
        assert_eq!(snapshot[0].metadata.base_unit.as_deref(), Some("requests"));
    }

    #[test]
    fn test_builder_is_reusable_across_registries() {
        let builder = TimerBuilder::new("db.query").tag("table", "users");
        let first = registry();
        let second = registry();

        let a = builder.create(&first);
        let b = builder.create(&second);
        let again = builder.create(&first);

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_gauge_builder_does_not_retain_target() {
        let registry = registry();
        let target = Arc::new(vec![1.0, 2.0]);
        let gauge = GaugeBuilder::new("buffer.len", &target, |v: &Vec<f64>| v.len() as f64)
            .base_unit("items")
            .create(&registry);
        assert_eq!(gauge.value(), 2.0);

        drop(target);
        assert!(gauge.is_stale());
    }

    #[test]
    fn test_builders_commit_against_dyn_registry() {
        let registry: Arc<dyn MeterRegistry> = Arc::new(registry());
        SummaryBuilder::new("payload")
            .create(registry.as_ref())
            .record(3.0);
        LongTaskTimerBuilder::new("sync").create(registry.as_ref());
        assert_eq!(registry.meter_count(), 2);
    }
}
