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

//! The in-memory registry.

use meterkit_core::{
    Clock, Counter, DistributionSummary, FunctionCounter, Gauge, LongTaskTimer, Meter, MeterHandle,
    MeterId, MeterMetadata, MeterSnapshot, MeterType, SystemClock, Timer,
};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::table::MeterTable;
use super::{sorted, CountingMode, MeterRegistry, RegistryConfig, METER_TYPES};
use crate::instruments::{
    CumulativeCounter, CumulativeFunctionCounter, CustomMeter, DefaultLongTaskTimer,
    DefaultSummary, DefaultTimer, GaugeFn, MeasureFn, ObservedGauge, StepCounter,
    StepFunctionCounter,
};

/// Keeps every meter in memory, aggregating either cumulatively or per step.
///
/// This is the registry exporters read from, and the usual child of a
/// [`CompositeMeterRegistry`](super::CompositeMeterRegistry).
pub struct SimpleMeterRegistry {
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    counters: MeterTable<dyn Counter>,
    timers: MeterTable<dyn Timer>,
    summaries: MeterTable<dyn DistributionSummary>,
    gauges: MeterTable<dyn Gauge>,
    long_task_timers: MeterTable<dyn LongTaskTimer>,
    function_counters: MeterTable<dyn FunctionCounter>,
    custom: MeterTable<dyn Meter>,
}

impl SimpleMeterRegistry {
    /// Creates a registry with explicit options.
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        log::debug!("Creating meter registry: {:?}", config);
        Self {
            clock,
            config,
            counters: MeterTable::new(),
            timers: MeterTable::new(),
            summaries: MeterTable::new(),
            gauges: MeterTable::new(),
            long_task_timers: MeterTable::new(),
            function_counters: MeterTable::new(),
            custom: MeterTable::new(),
        }
    }

    /// A registry whose values accumulate forever.
    pub fn cumulative(clock: Arc<dyn Clock>) -> Self {
        Self::new(RegistryConfig::default(), clock)
    }

    /// A registry reporting values per completed window of `step`.
    pub fn step(clock: Arc<dyn Clock>, step: Duration) -> Self {
        Self::new(RegistryConfig::step(step), clock)
    }

    /// The options this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn contains(&self, id: &MeterId) -> bool {
        match id.meter_type {
            MeterType::Counter => self.counters.contains(id),
            MeterType::Timer => self.timers.contains(id),
            MeterType::DistributionSummary => self.summaries.contains(id),
            MeterType::Gauge => self.gauges.contains(id),
            MeterType::LongTaskTimer => self.long_task_timers.contains(id),
            MeterType::FunctionCounter => self.function_counters.contains(id),
            MeterType::Other => self.custom.contains(id),
        }
    }

    /// Runs before a first registration. Must not be called while a table
    /// lock is held.
    fn warn_on_conflict(&self, id: &MeterId) {
        if self.contains(id) {
            return;
        }
        for other in METER_TYPES.iter().filter(|t| **t != id.meter_type) {
            if self.contains(&id.retyped(*other)) {
                log::warn!(
                    "Meter {} is already registered as {:?}; creating a separate {:?}",
                    id,
                    other,
                    id.meter_type
                );
            }
        }
    }

    fn prune_stale_gauges(&self) {
        let pruned = self.gauges.retain(|r| !r.meter.is_stale());
        if pruned > 0 {
            log::debug!("Removed {} gauges whose observed state was dropped", pruned);
        }
    }
}

fn snapshots<M: Meter + ?Sized>(table: &MeterTable<M>) -> impl Iterator<Item = MeterSnapshot> {
    table
        .entries()
        .into_iter()
        .map(|(id, registered)| MeterSnapshot {
            id,
            metadata: registered.metadata,
            measurements: registered.meter.measure(),
        })
}

impl Default for SimpleMeterRegistry {
    fn default() -> Self {
        Self::cumulative(Arc::new(SystemClock::new()))
    }
}

impl Debug for SimpleMeterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleMeterRegistry")
            .field("config", &self.config)
            .field("meters", &self.meter_count())
            .finish()
    }
}

impl MeterRegistry for SimpleMeterRegistry {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn register_counter(&self, id: MeterId, metadata: MeterMetadata) -> Arc<dyn Counter> {
        let id = id.retyped(MeterType::Counter);
        self.warn_on_conflict(&id);
        let negative = self.config.capabilities.negative_increments;
        self.counters
            .find_or_create(id, metadata, |id| match self.config.mode {
                CountingMode::Cumulative => {
                    Arc::new(CumulativeCounter::new(id.clone(), negative)) as Arc<dyn Counter>
                }
                CountingMode::Step(step) => Arc::new(StepCounter::new(
                    id.clone(),
                    self.clock.clone(),
                    step,
                    negative,
                )),
            })
    }

    fn register_timer(&self, id: MeterId, metadata: MeterMetadata) -> Arc<dyn Timer> {
        let id = id.retyped(MeterType::Timer);
        self.warn_on_conflict(&id);
        self.timers.find_or_create(id, metadata, |id| {
            Arc::new(DefaultTimer::new(
                id.clone(),
                self.clock.clone(),
                self.config.mode,
            ))
        })
    }

    fn register_summary(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
    ) -> Arc<dyn DistributionSummary> {
        let id = id.retyped(MeterType::DistributionSummary);
        self.warn_on_conflict(&id);
        self.summaries.find_or_create(id, metadata, |id| {
            Arc::new(DefaultSummary::new(
                id.clone(),
                self.clock.clone(),
                self.config.mode,
            ))
        })
    }

    fn register_gauge(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        observe: GaugeFn,
    ) -> Arc<dyn Gauge> {
        let id = id.retyped(MeterType::Gauge);
        self.warn_on_conflict(&id);
        self.gauges.find_or_create(id, metadata, |id| {
            Arc::new(ObservedGauge::new(id.clone(), observe))
        })
    }

    fn register_long_task_timer(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
    ) -> Arc<dyn LongTaskTimer> {
        let id = id.retyped(MeterType::LongTaskTimer);
        self.warn_on_conflict(&id);
        self.long_task_timers.find_or_create(id, metadata, |id| {
            Arc::new(DefaultLongTaskTimer::new(id.clone(), self.clock.clone()))
        })
    }

    fn register_function_counter(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        observe: GaugeFn,
    ) -> Arc<dyn FunctionCounter> {
        let id = id.retyped(MeterType::FunctionCounter);
        self.warn_on_conflict(&id);
        self.function_counters
            .find_or_create(id, metadata, |id| match self.config.mode {
                CountingMode::Cumulative => {
                    Arc::new(CumulativeFunctionCounter::new(id.clone(), observe))
                        as Arc<dyn FunctionCounter>
                }
                CountingMode::Step(step) => Arc::new(StepFunctionCounter::new(
                    id.clone(),
                    observe,
                    self.clock.clone(),
                    step,
                )),
            })
    }

    fn register_custom(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        measure: MeasureFn,
    ) -> Arc<dyn Meter> {
        let id = id.retyped(MeterType::Other);
        self.warn_on_conflict(&id);
        self.custom.find_or_create(id, metadata, |id| {
            Arc::new(CustomMeter::new(id.clone(), measure))
        })
    }

    fn find_meter(&self, id: &MeterId) -> Option<MeterHandle> {
        match id.meter_type {
            MeterType::Counter => self.counters.get(id).map(MeterHandle::Counter),
            MeterType::Timer => self.timers.get(id).map(MeterHandle::Timer),
            MeterType::DistributionSummary => {
                self.summaries.get(id).map(MeterHandle::DistributionSummary)
            }
            MeterType::Gauge => self.gauges.get(id).map(MeterHandle::Gauge),
            MeterType::LongTaskTimer => {
                self.long_task_timers.get(id).map(MeterHandle::LongTaskTimer)
            }
            MeterType::FunctionCounter => {
                self.function_counters.get(id).map(MeterHandle::FunctionCounter)
            }
            MeterType::Other => self.custom.get(id).map(MeterHandle::Custom),
        }
    }

    fn remove(&self, id: &MeterId) -> Option<MeterHandle> {
        let removed = match id.meter_type {
            MeterType::Counter => self.counters.remove(id).map(MeterHandle::Counter),
            MeterType::Timer => self.timers.remove(id).map(MeterHandle::Timer),
            MeterType::DistributionSummary => {
                self.summaries.remove(id).map(MeterHandle::DistributionSummary)
            }
            MeterType::Gauge => self.gauges.remove(id).map(MeterHandle::Gauge),
            MeterType::LongTaskTimer => {
                self.long_task_timers.remove(id).map(MeterHandle::LongTaskTimer)
            }
            MeterType::FunctionCounter => {
                self.function_counters.remove(id).map(MeterHandle::FunctionCounter)
            }
            MeterType::Other => self.custom.remove(id).map(MeterHandle::Custom),
        };
        if removed.is_some() {
            log::debug!("Removed meter: {}", id);
        }
        removed
    }

    fn meters(&self) -> Vec<MeterHandle> {
        let mut meters = Vec::with_capacity(self.meter_count());
        meters.extend(
            self.counters
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Counter(r.meter)),
        );
        meters.extend(
            self.timers
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Timer(r.meter)),
        );
        meters.extend(
            self.summaries
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::DistributionSummary(r.meter)),
        );
        meters.extend(
            self.gauges
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Gauge(r.meter)),
        );
        meters.extend(
            self.long_task_timers
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::LongTaskTimer(r.meter)),
        );
        meters.extend(
            self.function_counters
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::FunctionCounter(r.meter)),
        );
        meters.extend(
            self.custom
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Custom(r.meter)),
        );
        meters
    }

    fn snapshot(&self) -> Vec<MeterSnapshot> {
        self.prune_stale_gauges();
        sorted(
            snapshots(&self.counters)
                .chain(snapshots(&self.timers))
                .chain(snapshots(&self.summaries))
                .chain(snapshots(&self.gauges))
                .chain(snapshots(&self.long_task_timers))
                .chain(snapshots(&self.function_counters))
                .chain(snapshots(&self.custom))
                .collect(),
        )
    }

    fn meter_count(&self) -> usize {
        self.counters.len()
            + self.timers.len()
            + self.summaries.len()
            + self.gauges.len()
            + self.long_task_timers.len()
            + self.function_counters.len()
            + self.custom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MeterRegistryExt, NegativeIncrements, RegistryCapabilities};
    use meterkit_core::{Measurement, MockClock, Statistic, Tags};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> (Arc<MockClock>, SimpleMeterRegistry) {
        let clock = Arc::new(MockClock::new());
        let registry = SimpleMeterRegistry::cumulative(clock.clone());
        (clock, registry)
    }

    #[test]
    fn test_same_identity_returns_same_instance() {
        let (_, registry) = registry();
        let a = registry.counter("requests", [("method", "GET")]);
        let b = registry.counter("requests", [("method", "GET")]);
        let other = registry.counter("requests", [("method", "POST")]);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.meter_count(), 2);
    }

    #[test]
    fn test_type_conflict_creates_separate_meter() {
        let (_, registry) = registry();
        let counter = registry.counter("jobs", Tags::empty());
        let timer = registry.timer("jobs", Tags::empty());

        counter.increment();
        timer.record(Duration::from_millis(5));

        assert_eq!(registry.meter_count(), 2);
        assert_eq!(registry.find("jobs").len(), 2);
        assert_eq!(counter.count(), 1.0);
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn test_step_registry_counts_per_window() {
        let clock = Arc::new(MockClock::new());
        let registry = SimpleMeterRegistry::step(clock.clone(), Duration::from_secs(60));
        let counter = registry.counter("requests", Tags::empty());

        counter.increment_by(4.0);
        assert_eq!(counter.count(), 0.0);
        clock.add(Duration::from_secs(60));
        assert_eq!(counter.count(), 4.0);
    }

    #[test]
    fn test_capabilities_reach_counters() {
        let clock = Arc::new(MockClock::new());
        let registry = SimpleMeterRegistry::new(
            RegistryConfig {
                mode: CountingMode::Cumulative,
                capabilities: RegistryCapabilities {
                    negative_increments: NegativeIncrements::Allow,
                },
            },
            clock,
        );
        let balance = registry.counter("balance", Tags::empty());
        balance.increment_by(10.0);
        balance.increment_by(-3.0);
        assert_eq!(balance.count(), 7.0);
    }

    #[test]
    fn test_snapshot_is_sorted_and_prunes_dead_gauges() {
        let (_, registry) = registry();
        registry.counter("b.requests", Tags::empty()).increment();
        registry.counter("a.requests", Tags::empty()).increment_by(2.0);

        let kept = registry.gauge("c.pool", Tags::empty(), Arc::new(8_u32), |v| *v as f64);
        let dropped = registry.gauge("d.cache", Tags::empty(), Arc::new(1_u32), |v| *v as f64);
        drop(dropped);
        assert_eq!(registry.meter_count(), 4);

        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.iter().map(|s| s.id.name.as_str()).collect();
        assert_eq!(names, vec!["a.requests", "b.requests", "c.pool"]);
        assert_eq!(
            snapshot[2].measurements,
            vec![Measurement::new(Statistic::Value, 8.0)]
        );
        assert_eq!(registry.meter_count(), 3);
        drop(kept);
    }

    #[test]
    fn test_existing_gauge_keeps_first_observation() {
        let (_, registry) = registry();
        let first = registry.gauge("threads", Tags::empty(), Arc::new(4_u32), |v| *v as f64);
        let _second = registry.gauge("threads", Tags::empty(), Arc::new(9_u32), |v| *v as f64);

        let id = MeterId::new("threads", MeterType::Gauge);
        let gauge = registry.find_meter(&id).unwrap();
        assert_eq!(gauge.as_gauge().unwrap().value(), 4.0);
        drop(first);
    }

    #[test]
    fn test_remove() {
        let (_, registry) = registry();
        let counter = registry.counter("temp", Tags::empty());
        let id = counter.id().clone();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.find_meter(&id).is_none());
        // The handle still works, it just is no longer reported.
        counter.increment();
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_first_lookup_creates_one_meter() {
        let (_, registry) = registry();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let counter = registry.counter("racy", Tags::empty());
                    counter.increment();
                    calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(registry.meter_count(), 1);
        assert_eq!(registry.counter("racy", Tags::empty()).count(), 8.0);
    }

    #[test]
    fn test_function_counter_follows_mode_and_outlives_target() {
        let (_, registry) = registry();
        let evictions = registry.function_counter(
            "cache.evictions",
            Tags::empty(),
            Arc::new(AtomicUsize::new(4)),
            |e| e.load(Ordering::Relaxed) as f64,
        );
        let id = MeterId::new("cache.evictions", MeterType::FunctionCounter);
        let counter = registry.find_meter(&id).unwrap();
        assert_eq!(counter.as_function_counter().unwrap().count(), 4.0);

        drop(evictions);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot[0].measurements,
            vec![Measurement::new(Statistic::Count, 4.0)]
        );

        let clock = Arc::new(MockClock::new());
        let stepped = SimpleMeterRegistry::step(clock.clone(), Duration::from_secs(10));
        let hits = stepped.function_counter(
            "hits",
            Tags::empty(),
            Arc::new(AtomicUsize::new(6)),
            |h| h.load(Ordering::Relaxed) as f64,
        );
        let id = MeterId::new("hits", MeterType::FunctionCounter);
        let counter = stepped.find_meter(&id).unwrap();
        assert_eq!(counter.as_function_counter().unwrap().count(), 0.0);
        clock.add_seconds(10);
        assert_eq!(counter.as_function_counter().unwrap().count(), 6.0);
        drop(hits);
    }

    #[test]
    fn test_custom_meter_is_reported_and_removable() {
        let (_, registry) = registry();
        let meter = registry.custom("pool", [("name", "db")], || {
            vec![
                Measurement::new(Statistic::Value, 3.0),
                Measurement::new(Statistic::Max, 8.0),
            ]
        });
        assert_eq!(meter.id().meter_type, MeterType::Other);
        let again = registry.custom("pool", [("name", "db")], Vec::new);
        assert!(Arc::ptr_eq(&meter, &again));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].measurements.len(), 2);

        assert!(matches!(
            registry.remove(meter.id()),
            Some(MeterHandle::Custom(_))
        ));
        assert_eq!(registry.meter_count(), 0);
    }

    #[test]
    fn test_long_task_timer_and_summary_are_reported() {
        let (clock, registry) = registry();
        let tasks = registry.long_task_timer("backup", Tags::empty());
        let sample = tasks.start();
        clock.add_seconds(3);
        registry.summary("payload", Tags::empty()).record(512.0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id.name, "backup");
        assert_eq!(
            snapshot[0].measurements,
            vec![
                Measurement::new(Statistic::ActiveTasks, 1.0),
                Measurement::new(Statistic::Duration, 3.0),
            ]
        );
        assert_eq!(tasks.stop(sample), Some(Duration::from_secs(3)));
    }
}
