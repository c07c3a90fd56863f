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

//! A registry fanning out to a dynamic set of child registries.
//!
//! Each composite meter holds one concrete meter per child. Updates go to
//! every child; reads come from the first child, or a neutral value when
//! there are none. Handles returned by the composite stay valid while
//! children come and go: adding a child registers every existing composite
//! meter with it, removing a child detaches it from every composite meter.
//!
//! A child that panics while handling an update is logged and skipped; the
//! children after it still receive the update.
//!
//! Lock order: membership, then the child list, then a meter table, then the
//! children of a single composite meter. Creating a meter takes a table and
//! then the child list, never membership. Adding or removing a child holds
//! membership for the whole change, so a concurrent add and remove of the
//! same child cannot interleave their walks over the meter tables.

use meterkit_core::{
    Clock, Counter, DistributionSummary, FunctionCounter, Gauge, LongTaskSample, LongTaskTimer,
    Measurement, Meter, MeterHandle, MeterId, MeterMetadata, MeterSnapshot, MeterType, Statistic,
    SystemClock, Timer,
};
use std::collections::HashMap;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::table::MeterTable;
use super::{sorted, MeterRegistry};
use crate::instruments::{lock, read, write, GaugeFn, MeasureFn};

/// Identifies a child registry by the address of its allocation.
type RegistryKey = usize;

fn key_of(registry: &Arc<dyn MeterRegistry>) -> RegistryKey {
    Arc::as_ptr(registry) as *const () as usize
}

type Register<M> = Box<dyn Fn(&dyn MeterRegistry) -> Arc<M> + Send + Sync>;

/// Runs one child's share of a fan-out, logging and swallowing a panic.
fn isolated<R>(id: &MeterId, key: RegistryKey, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(_) => {
            log::error!("Child registry {:#x} panicked while updating {}", key, id);
            None
        }
    }
}

/// Something that keeps per-child state and must follow the child set.
trait ChildAware {
    fn add_child(&self, key: RegistryKey, registry: &dyn MeterRegistry);
    fn remove_child(&self, key: RegistryKey);
}

/// A composite meter of kind `M`.
pub(crate) struct CompositeMeter<M: ?Sized> {
    id: MeterId,
    clock: Arc<dyn Clock>,
    register: Register<M>,
    children: RwLock<Vec<(RegistryKey, Arc<M>)>>,
}

impl<M: ?Sized> CompositeMeter<M> {
    fn new(id: MeterId, clock: Arc<dyn Clock>, register: Register<M>) -> Self {
        Self {
            id,
            clock,
            register,
            children: RwLock::new(Vec::new()),
        }
    }

    fn first(&self) -> Option<Arc<M>> {
        read(&self.children).first().map(|(_, meter)| meter.clone())
    }

    fn for_each(&self, mut f: impl FnMut(&M)) {
        for (key, meter) in read(&self.children).iter() {
            isolated(&self.id, *key, || f(meter));
        }
    }

    fn child(&self, key: RegistryKey) -> Option<Arc<M>> {
        read(&self.children)
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, meter)| meter.clone())
    }
}

impl<M: ?Sized> ChildAware for CompositeMeter<M> {
    fn add_child(&self, key: RegistryKey, registry: &dyn MeterRegistry) {
        let mut children = write(&self.children);
        if children.iter().any(|(k, _)| *k == key) {
            return;
        }
        children.push((key, (self.register)(registry)));
    }

    fn remove_child(&self, key: RegistryKey) {
        write(&self.children).retain(|(k, _)| *k != key);
    }
}

impl<M: ?Sized> Debug for CompositeMeter<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeMeter")
            .field("id", &self.id)
            .field("children", &read(&self.children).len())
            .finish()
    }
}

fn neutral_measurements(meter_type: MeterType) -> Vec<Measurement> {
    match meter_type {
        MeterType::Counter => vec![Measurement::new(Statistic::Count, 0.0)],
        MeterType::Timer => vec![
            Measurement::new(Statistic::Count, 0.0),
            Measurement::new(Statistic::TotalTime, 0.0),
            Measurement::new(Statistic::Max, 0.0),
        ],
        MeterType::DistributionSummary => vec![
            Measurement::new(Statistic::Count, 0.0),
            Measurement::new(Statistic::Total, 0.0),
            Measurement::new(Statistic::Max, 0.0),
        ],
        MeterType::Gauge => vec![Measurement::new(Statistic::Value, f64::NAN)],
        MeterType::LongTaskTimer => vec![
            Measurement::new(Statistic::ActiveTasks, 0.0),
            Measurement::new(Statistic::Duration, 0.0),
        ],
        MeterType::FunctionCounter => vec![Measurement::new(Statistic::Count, 0.0)],
        MeterType::Other => Vec::new(),
    }
}

impl<M: Meter + ?Sized> Meter for CompositeMeter<M> {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        self.first()
            .map(|meter| meter.measure())
            .unwrap_or_else(|| neutral_measurements(self.id.meter_type))
    }
}

impl Counter for CompositeMeter<dyn Counter> {
    fn increment_by(&self, amount: f64) {
        self.for_each(|counter| counter.increment_by(amount));
    }

    fn count(&self) -> f64 {
        self.first().map_or(0.0, |counter| counter.count())
    }
}

impl Timer for CompositeMeter<dyn Timer> {
    fn record(&self, duration: Duration) {
        self.for_each(|timer| timer.record(duration));
    }

    fn count(&self) -> u64 {
        self.first().map_or(0, |timer| timer.count())
    }

    fn total_time(&self) -> Duration {
        self.first().map_or(Duration::ZERO, |timer| timer.total_time())
    }

    fn max(&self) -> Duration {
        self.first().map_or(Duration::ZERO, |timer| timer.max())
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl DistributionSummary for CompositeMeter<dyn DistributionSummary> {
    fn record(&self, amount: f64) {
        self.for_each(|summary| summary.record(amount));
    }

    fn count(&self) -> u64 {
        self.first().map_or(0, |summary| summary.count())
    }

    fn total_amount(&self) -> f64 {
        self.first().map_or(0.0, |summary| summary.total_amount())
    }

    fn max(&self) -> f64 {
        self.first().map_or(0.0, |summary| summary.max())
    }
}

impl FunctionCounter for CompositeMeter<dyn FunctionCounter> {
    fn count(&self) -> f64 {
        self.first().map_or(0.0, |counter| counter.count())
    }
}

/// Gauges keep their own observation so staleness does not depend on which
/// children are attached.
pub(crate) struct CompositeGauge {
    meter: CompositeMeter<dyn Gauge>,
    observe: GaugeFn,
}

impl Debug for CompositeGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeGauge")
            .field("meter", &self.meter)
            .field("stale", &self.is_stale())
            .finish()
    }
}

impl ChildAware for CompositeGauge {
    fn add_child(&self, key: RegistryKey, registry: &dyn MeterRegistry) {
        self.meter.add_child(key, registry);
    }

    fn remove_child(&self, key: RegistryKey) {
        self.meter.remove_child(key);
    }
}

impl Meter for CompositeGauge {
    fn id(&self) -> &MeterId {
        self.meter.id()
    }

    fn measure(&self) -> Vec<Measurement> {
        self.meter.measure()
    }
}

impl Gauge for CompositeGauge {
    fn value(&self) -> f64 {
        self.meter.first().map_or(f64::NAN, |gauge| gauge.value())
    }

    fn is_stale(&self) -> bool {
        (self.observe)().is_none()
    }
}

/// Long task timers also map each composite task to the samples started on
/// the children, so a task can be stopped everywhere it was started.
#[derive(Debug)]
pub(crate) struct CompositeLongTaskTimer {
    meter: CompositeMeter<dyn LongTaskTimer>,
    next_task: AtomicU64,
    tasks: Mutex<HashMap<u64, Vec<(RegistryKey, LongTaskSample)>>>,
}

impl ChildAware for CompositeLongTaskTimer {
    fn add_child(&self, key: RegistryKey, registry: &dyn MeterRegistry) {
        self.meter.add_child(key, registry);
    }

    fn remove_child(&self, key: RegistryKey) {
        self.meter.remove_child(key);
    }
}

impl Meter for CompositeLongTaskTimer {
    fn id(&self) -> &MeterId {
        self.meter.id()
    }

    fn measure(&self) -> Vec<Measurement> {
        self.meter.measure()
    }
}

impl LongTaskTimer for CompositeLongTaskTimer {
    fn start(&self) -> LongTaskSample {
        let task = self.next_task.fetch_add(1, Ordering::Relaxed);
        let mut started = Vec::new();
        for (key, timer) in read(&self.meter.children).iter() {
            if let Some(sample) = isolated(self.id(), *key, || timer.start()) {
                started.push((*key, sample));
            }
        }
        lock(&self.tasks).insert(task, started);
        LongTaskSample(task)
    }

    fn stop(&self, sample: LongTaskSample) -> Option<Duration> {
        let started = lock(&self.tasks).remove(&sample.0)?;
        let mut elapsed = None;
        for (key, child_sample) in started {
            if let Some(timer) = self.meter.child(key) {
                let stopped = isolated(self.id(), key, || timer.stop(child_sample)).flatten();
                elapsed = elapsed.or(stopped);
            }
        }
        elapsed
    }

    fn active_tasks(&self) -> usize {
        self.meter.first().map_or(0, |timer| timer.active_tasks())
    }

    fn duration(&self) -> Duration {
        self.meter
            .first()
            .map_or(Duration::ZERO, |timer| timer.duration())
    }
}

/// Fans every meter out to a dynamic set of child registries.
pub struct CompositeMeterRegistry {
    clock: Arc<dyn Clock>,
    membership: Mutex<()>,
    children: RwLock<Vec<Arc<dyn MeterRegistry>>>,
    counters: MeterTable<CompositeMeter<dyn Counter>>,
    timers: MeterTable<CompositeMeter<dyn Timer>>,
    summaries: MeterTable<CompositeMeter<dyn DistributionSummary>>,
    gauges: MeterTable<CompositeGauge>,
    long_task_timers: MeterTable<CompositeLongTaskTimer>,
    function_counters: MeterTable<CompositeMeter<dyn FunctionCounter>>,
    custom: MeterTable<CompositeMeter<dyn Meter>>,
}

impl CompositeMeterRegistry {
    /// Creates a composite with no children. `clock` times closures passed
    /// to composite timers.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            membership: Mutex::new(()),
            children: RwLock::new(Vec::new()),
            counters: MeterTable::new(),
            timers: MeterTable::new(),
            summaries: MeterTable::new(),
            gauges: MeterTable::new(),
            long_task_timers: MeterTable::new(),
            function_counters: MeterTable::new(),
            custom: MeterTable::new(),
        }
    }

    /// Adds a child registry and registers every existing composite meter
    /// with it. Returns `false` if it was already a child.
    pub fn add_registry(&self, registry: Arc<dyn MeterRegistry>) -> bool {
        let key = key_of(&registry);
        if key == self as *const Self as *const () as usize {
            log::warn!("Refusing to add a composite registry to itself");
            return false;
        }
        let _membership = lock(&self.membership);
        {
            let mut children = write(&self.children);
            if children.iter().any(|child| key_of(child) == key) {
                return false;
            }
            children.push(registry.clone());
        }

        for meter in self.composite_meters() {
            meter.add_child(key, registry.as_ref());
        }
        log::debug!("Added child registry {:?}", registry);
        true
    }

    /// Removes a child registry. Composite meters stop forwarding to it;
    /// the child keeps its own meters. Returns `false` if it was not a child.
    pub fn remove_registry(&self, registry: &Arc<dyn MeterRegistry>) -> bool {
        let key = key_of(registry);
        let _membership = lock(&self.membership);
        {
            let mut children = write(&self.children);
            let before = children.len();
            children.retain(|child| key_of(child) != key);
            if children.len() == before {
                return false;
            }
        }

        for meter in self.composite_meters() {
            meter.remove_child(key);
        }
        log::debug!("Removed child registry {:?}", registry);
        true
    }

    /// The current children, in insertion order.
    pub fn registries(&self) -> Vec<Arc<dyn MeterRegistry>> {
        read(&self.children).clone()
    }

    fn composite_meters(&self) -> Vec<Arc<dyn ChildAware>> {
        let mut meters: Vec<Arc<dyn ChildAware>> = Vec::new();
        meters.extend(
            self.counters
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters.extend(
            self.timers
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters.extend(
            self.summaries
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters.extend(
            self.gauges
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters.extend(
            self.long_task_timers
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters.extend(
            self.function_counters
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters.extend(
            self.custom
                .entries()
                .into_iter()
                .map(|(_, r)| r.meter as Arc<dyn ChildAware>),
        );
        meters
    }

    /// Attaches every current child to a freshly created composite meter.
    fn attach_children(&self, meter: &dyn ChildAware) {
        for child in read(&self.children).iter() {
            meter.add_child(key_of(child), child.as_ref());
        }
    }

    fn composite<M: ?Sized>(&self, id: &MeterId, register: Register<M>) -> CompositeMeter<M>
    where
        CompositeMeter<M>: ChildAware,
    {
        let meter = CompositeMeter::new(id.clone(), self.clock.clone(), register);
        self.attach_children(&meter);
        meter
    }
}

impl Default for CompositeMeterRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

impl Debug for CompositeMeterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeMeterRegistry")
            .field("children", &read(&self.children).len())
            .field("meters", &self.meter_count())
            .finish()
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

impl MeterRegistry for CompositeMeterRegistry {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn register_counter(&self, id: MeterId, metadata: MeterMetadata) -> Arc<dyn Counter> {
        let id = id.retyped(MeterType::Counter);
        let child_metadata = metadata.clone();
        self.counters.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let register: Register<dyn Counter> = Box::new(move |registry: &dyn MeterRegistry| {
                registry.register_counter(child_id.clone(), child_metadata.clone())
            });
            Arc::new(self.composite(id, register))
        })
    }

    fn register_timer(&self, id: MeterId, metadata: MeterMetadata) -> Arc<dyn Timer> {
        let id = id.retyped(MeterType::Timer);
        let child_metadata = metadata.clone();
        self.timers.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let register: Register<dyn Timer> = Box::new(move |registry: &dyn MeterRegistry| {
                registry.register_timer(child_id.clone(), child_metadata.clone())
            });
            Arc::new(self.composite(id, register))
        })
    }

    fn register_summary(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
    ) -> Arc<dyn DistributionSummary> {
        let id = id.retyped(MeterType::DistributionSummary);
        let child_metadata = metadata.clone();
        self.summaries.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let register: Register<dyn DistributionSummary> =
                Box::new(move |registry: &dyn MeterRegistry| {
                    registry.register_summary(child_id.clone(), child_metadata.clone())
                });
            Arc::new(self.composite(id, register))
        })
    }

    fn register_gauge(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        observe: GaugeFn,
    ) -> Arc<dyn Gauge> {
        let id = id.retyped(MeterType::Gauge);
        let child_metadata = metadata.clone();
        self.gauges.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let child_observe = observe.clone();
            let register: Register<dyn Gauge> = Box::new(move |registry: &dyn MeterRegistry| {
                registry.register_gauge(
                    child_id.clone(),
                    child_metadata.clone(),
                    child_observe.clone(),
                )
            });
            Arc::new(CompositeGauge {
                meter: self.composite(id, register),
                observe,
            })
        })
    }

    fn register_long_task_timer(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
    ) -> Arc<dyn LongTaskTimer> {
        let id = id.retyped(MeterType::LongTaskTimer);
        let child_metadata = metadata.clone();
        self.long_task_timers.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let register: Register<dyn LongTaskTimer> =
                Box::new(move |registry: &dyn MeterRegistry| {
                    registry.register_long_task_timer(child_id.clone(), child_metadata.clone())
                });
            Arc::new(CompositeLongTaskTimer {
                meter: self.composite(id, register),
                next_task: AtomicU64::new(0),
                tasks: Mutex::new(HashMap::new()),
            })
        })
    }

    fn register_function_counter(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        observe: GaugeFn,
    ) -> Arc<dyn FunctionCounter> {
        let id = id.retyped(MeterType::FunctionCounter);
        let child_metadata = metadata.clone();
        self.function_counters.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let register: Register<dyn FunctionCounter> =
                Box::new(move |registry: &dyn MeterRegistry| {
                    registry.register_function_counter(
                        child_id.clone(),
                        child_metadata.clone(),
                        observe.clone(),
                    )
                });
            Arc::new(self.composite(id, register))
        })
    }

    fn register_custom(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        measure: MeasureFn,
    ) -> Arc<dyn Meter> {
        let id = id.retyped(MeterType::Other);
        let child_metadata = metadata.clone();
        self.custom.find_or_create(id, metadata, |id| {
            let child_id = id.clone();
            let register: Register<dyn Meter> = Box::new(move |registry: &dyn MeterRegistry| {
                registry.register_custom(child_id.clone(), child_metadata.clone(), measure.clone())
            });
            Arc::new(self.composite(id, register))
        })
    }

    fn find_meter(&self, id: &MeterId) -> Option<MeterHandle> {
        match id.meter_type {
            MeterType::Counter => self
                .counters
                .get(id)
                .map(|m| MeterHandle::Counter(m as Arc<dyn Counter>)),
            MeterType::Timer => self
                .timers
                .get(id)
                .map(|m| MeterHandle::Timer(m as Arc<dyn Timer>)),
            MeterType::DistributionSummary => self
                .summaries
                .get(id)
                .map(|m| MeterHandle::DistributionSummary(m as Arc<dyn DistributionSummary>)),
            MeterType::Gauge => self
                .gauges
                .get(id)
                .map(|m| MeterHandle::Gauge(m as Arc<dyn Gauge>)),
            MeterType::LongTaskTimer => self
                .long_task_timers
                .get(id)
                .map(|m| MeterHandle::LongTaskTimer(m as Arc<dyn LongTaskTimer>)),
            MeterType::FunctionCounter => self
                .function_counters
                .get(id)
                .map(|m| MeterHandle::FunctionCounter(m as Arc<dyn FunctionCounter>)),
            MeterType::Other => self
                .custom
                .get(id)
                .map(|m| MeterHandle::Custom(m as Arc<dyn Meter>)),
        }
    }

    /// Removes the composite meter and the matching meter of every child.
    fn remove(&self, id: &MeterId) -> Option<MeterHandle> {
        let removed = self.find_meter(id)?;
        match id.meter_type {
            MeterType::Counter => drop(self.counters.remove(id)),
            MeterType::Timer => drop(self.timers.remove(id)),
            MeterType::DistributionSummary => drop(self.summaries.remove(id)),
            MeterType::Gauge => drop(self.gauges.remove(id)),
            MeterType::LongTaskTimer => drop(self.long_task_timers.remove(id)),
            MeterType::FunctionCounter => drop(self.function_counters.remove(id)),
            MeterType::Other => drop(self.custom.remove(id)),
        }
        for child in self.registries() {
            child.remove(id);
        }
        log::debug!("Removed composite meter: {}", id);
        Some(removed)
    }

    fn meters(&self) -> Vec<MeterHandle> {
        let mut meters = Vec::with_capacity(self.meter_count());
        meters.extend(
            self.counters
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Counter(r.meter as Arc<dyn Counter>)),
        );
        meters.extend(
            self.timers
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Timer(r.meter as Arc<dyn Timer>)),
        );
        meters.extend(self.summaries.entries().into_iter().map(|(_, r)| {
            MeterHandle::DistributionSummary(r.meter as Arc<dyn DistributionSummary>)
        }));
        meters.extend(
            self.gauges
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Gauge(r.meter as Arc<dyn Gauge>)),
        );
        meters.extend(
            self.long_task_timers
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::LongTaskTimer(r.meter as Arc<dyn LongTaskTimer>)),
        );
        meters.extend(self.function_counters.entries().into_iter().map(|(_, r)| {
            MeterHandle::FunctionCounter(r.meter as Arc<dyn FunctionCounter>)
        }));
        meters.extend(
            self.custom
                .entries()
                .into_iter()
                .map(|(_, r)| MeterHandle::Custom(r.meter as Arc<dyn Meter>)),
        );
        meters
    }

    fn snapshot(&self) -> Vec<MeterSnapshot> {
        let pruned = self.gauges.retain(|r| !r.meter.is_stale());
        if pruned > 0 {
            log::debug!("Removed {} composite gauges whose observed state was dropped", pruned);
        }
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
