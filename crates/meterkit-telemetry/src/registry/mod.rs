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

//! Meter registries.
//!
//! A registry owns meters keyed by [`MeterId`] and hands out shared handles.
//! Asking twice for the same identity returns the same instance; asking for
//! the same name and tags with a different meter type creates a second,
//! independent meter and logs a warning.

pub mod builder;
pub mod composite;
pub mod config;
pub mod simple;
pub(crate) mod table;

pub use builder::{
    CounterBuilder, GaugeBuilder, LongTaskTimerBuilder, SummaryBuilder, TimerBuilder,
};
pub use composite::CompositeMeterRegistry;
pub use config::{CountingMode, NegativeIncrements, RegistryCapabilities, RegistryConfig};
pub use simple::SimpleMeterRegistry;

use meterkit_core::{
    Clock, Counter, DistributionSummary, FunctionCounter, Gauge, LongTaskTimer, Measurement, Meter,
    MeterHandle, MeterId, MeterMetadata, MeterSnapshot, MeterType, Tags, Timer,
};
use std::fmt::Debug;
use std::sync::Arc;

use crate::instruments::{weak_observation, GaugeFn, MeasureFn};

/// Every meter type, in the order registries report them.
pub(crate) const METER_TYPES: [MeterType; 7] = [
    MeterType::Counter,
    MeterType::Timer,
    MeterType::DistributionSummary,
    MeterType::Gauge,
    MeterType::LongTaskTimer,
    MeterType::FunctionCounter,
    MeterType::Other,
];

/// Find-or-create access to meters, plus the views exporters need.
///
/// The `register_*` methods take a fully built identity; the meter type of
/// the id is overwritten with the one matching the method.
pub trait MeterRegistry: Send + Sync + Debug {
    /// The clock all meters of this registry read.
    fn clock(&self) -> Arc<dyn Clock>;

    /// Finds or creates a counter.
    fn register_counter(&self, id: MeterId, metadata: MeterMetadata) -> Arc<dyn Counter>;

    /// Finds or creates a timer.
    fn register_timer(&self, id: MeterId, metadata: MeterMetadata) -> Arc<dyn Timer>;

    /// Finds or creates a distribution summary.
    fn register_summary(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
    ) -> Arc<dyn DistributionSummary>;

    /// Finds or creates a gauge. When the gauge already exists, `observe` is
    /// discarded and the existing gauge keeps observing what it did before.
    fn register_gauge(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        observe: GaugeFn,
    ) -> Arc<dyn Gauge>;

    /// Finds or creates a long task timer.
    fn register_long_task_timer(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
    ) -> Arc<dyn LongTaskTimer>;

    /// Finds or creates a counter reading its count through `observe`. When
    /// the counter already exists, `observe` is discarded.
    fn register_function_counter(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        observe: GaugeFn,
    ) -> Arc<dyn FunctionCounter>;

    /// Finds or creates a meter reporting whatever `measure` returns. The id
    /// is retyped to [`MeterType::Other`].
    fn register_custom(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        measure: MeasureFn,
    ) -> Arc<dyn Meter>;

    /// Looks up a meter by exact identity.
    fn find_meter(&self, id: &MeterId) -> Option<MeterHandle>;

    /// Unregisters a meter. Existing handles keep working but are no longer
    /// reported.
    fn remove(&self, id: &MeterId) -> Option<MeterHandle>;

    /// Every registered meter.
    fn meters(&self) -> Vec<MeterHandle>;

    /// Samples every live meter, sorted by identity. Gauges whose observed
    /// state has been dropped are unregistered instead of reported.
    fn snapshot(&self) -> Vec<MeterSnapshot>;

    /// The number of registered meters.
    fn meter_count(&self) -> usize {
        self.meters().len()
    }

    /// Every meter with the given name, whatever its tags or type.
    fn find(&self, name: &str) -> Vec<MeterHandle> {
        self.meters()
            .into_iter()
            .filter(|meter| meter.id().name == name)
            .collect()
    }
}

/// Shorthands for registering meters by name and tags.
///
/// Implemented for every [`MeterRegistry`], including `dyn MeterRegistry`.
pub trait MeterRegistryExt: MeterRegistry {
    /// Finds or creates a counter.
    fn counter(&self, name: &str, tags: impl Into<Tags>) -> Arc<dyn Counter> {
        self.register_counter(id(name, tags, MeterType::Counter), MeterMetadata::default())
    }

    /// Finds or creates a timer.
    fn timer(&self, name: &str, tags: impl Into<Tags>) -> Arc<dyn Timer> {
        self.register_timer(id(name, tags, MeterType::Timer), MeterMetadata::default())
    }

    /// Finds or creates a distribution summary.
    fn summary(&self, name: &str, tags: impl Into<Tags>) -> Arc<dyn DistributionSummary> {
        self.register_summary(
            id(name, tags, MeterType::DistributionSummary),
            MeterMetadata::default(),
        )
    }

    /// Finds or creates a long task timer.
    fn long_task_timer(&self, name: &str, tags: impl Into<Tags>) -> Arc<dyn LongTaskTimer> {
        self.register_long_task_timer(
            id(name, tags, MeterType::LongTaskTimer),
            MeterMetadata::default(),
        )
    }

    /// Registers a gauge applying `value` to `target`, and hands `target`
    /// back. The registry only keeps a weak reference to it.
    fn gauge<T, F>(&self, name: &str, tags: impl Into<Tags>, target: Arc<T>, value: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.register_gauge(
            id(name, tags, MeterType::Gauge),
            MeterMetadata::default(),
            weak_observation(&target, value),
        );
        target
    }

    /// Registers a counter reading a monotonic count from `target` through
    /// `count`, and hands `target` back. Only a weak reference is kept.
    fn function_counter<T, F>(
        &self,
        name: &str,
        tags: impl Into<Tags>,
        target: Arc<T>,
        count: F,
    ) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.register_function_counter(
            id(name, tags, MeterType::FunctionCounter),
            MeterMetadata::default(),
            weak_observation(&target, count),
        );
        target
    }

    /// Registers a meter whose measurements are produced by `measure` on
    /// every sample.
    fn custom<F>(&self, name: &str, tags: impl Into<Tags>, measure: F) -> Arc<dyn Meter>
    where
        F: Fn() -> Vec<Measurement> + Send + Sync + 'static,
    {
        self.register_custom(
            id(name, tags, MeterType::Other),
            MeterMetadata::default(),
            Arc::new(measure),
        )
    }
}

impl<R: MeterRegistry + ?Sized> MeterRegistryExt for R {}

fn id(name: &str, tags: impl Into<Tags>, meter_type: MeterType) -> MeterId {
    MeterId::new(name, meter_type).with_tags(tags)
}

/// Sorts snapshots by identity, the order every registry reports in.
pub(crate) fn sorted(mut snapshots: Vec<MeterSnapshot>) -> Vec<MeterSnapshot> {
    snapshots.sort_by(|a, b| a.id.cmp(&b.id));
    snapshots
}
