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

//! Abstract definitions for meters.
//!
//! This module only describes *what* a meter is. The concrete cumulative and
//! step implementations, and the registries that own them, live in
//! `meterkit-telemetry`.

pub mod id;

pub use self::id::{MeterId, MeterMetadata, Tag, Tags};

use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// The fundamental type of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MeterType {
    /// A monotonically accumulating count (e.g. total requests).
    Counter,
    /// Count, total and max of recorded durations.
    Timer,
    /// Count, total and max of recorded amounts (e.g. payload sizes).
    DistributionSummary,
    /// An instantaneous value observed from user-owned state.
    Gauge,
    /// Tracks tasks that are still running.
    LongTaskTimer,
    /// A monotonic count read from user-owned state.
    FunctionCounter,
    /// A meter whose measurements are supplied by the caller.
    Other,
}

/// The kind of value carried by a [`Measurement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Statistic {
    /// Number of events.
    Count,
    /// Sum of recorded amounts.
    Total,
    /// Sum of recorded durations, in seconds.
    TotalTime,
    /// Largest recorded value.
    Max,
    /// Instantaneous value.
    Value,
    /// Number of running tasks.
    ActiveTasks,
    /// Cumulative age of running tasks, in seconds.
    Duration,
}

impl Statistic {
    /// The lower-case name used as a suffix or dimension when exporting.
    pub fn tag_value(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Total => "total",
            Statistic::TotalTime => "totalTime",
            Statistic::Max => "max",
            Statistic::Value => "value",
            Statistic::ActiveTasks => "activeTasks",
            Statistic::Duration => "duration",
        }
    }
}

/// A single sampled value of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// What the value represents.
    pub statistic: Statistic,
    /// The sampled value.
    pub value: f64,
}

impl Measurement {
    /// Creates a new measurement.
    pub fn new(statistic: Statistic, value: f64) -> Self {
        Self { statistic, value }
    }
}

/// Behaviour shared by every meter.
pub trait Meter: Send + Sync + Debug {
    /// The identity of this meter.
    fn id(&self) -> &MeterId;

    /// Samples the current value(s) of this meter.
    fn measure(&self) -> Vec<Measurement>;
}

/// A meter that accumulates a count.
pub trait Counter: Meter {
    /// Adds `amount` to the counter. Never fails.
    fn increment_by(&self, amount: f64);

    /// The current count. For step counters this is the last completed window.
    fn count(&self) -> f64;

    /// Adds one to the counter.
    fn increment(&self) {
        self.increment_by(1.0);
    }
}

/// A meter that records durations.
pub trait Timer: Meter {
    /// Records a single duration.
    fn record(&self, duration: Duration);

    /// Number of recorded durations.
    fn count(&self) -> u64;

    /// Sum of recorded durations.
    fn total_time(&self) -> Duration;

    /// Longest recorded duration.
    fn max(&self) -> Duration;

    /// The clock used to time closures passed to `record_with`.
    fn clock(&self) -> Arc<dyn Clock>;

    /// Average recorded duration, or zero when nothing was recorded.
    fn mean(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            n => Duration::from_secs_f64(self.total_time().as_secs_f64() / n as f64),
        }
    }
}

impl dyn Timer {
    /// Runs `f`, recording how long it took on this timer's clock.
    pub fn record_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let clock = self.clock();
        let start = clock.monotonic_time();
        let result = f();
        let elapsed = clock.monotonic_time().saturating_sub(start);
        self.record(Duration::from_nanos(elapsed));
        result
    }
}

/// A meter that records the distribution of arbitrary amounts.
pub trait DistributionSummary: Meter {
    /// Records a single amount. Negative amounts are ignored.
    fn record(&self, amount: f64);

    /// Number of recorded amounts.
    fn count(&self) -> u64;

    /// Sum of recorded amounts.
    fn total_amount(&self) -> f64;

    /// Largest recorded amount.
    fn max(&self) -> f64;

    /// Average recorded amount, or zero when nothing was recorded.
    fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_amount() / n as f64,
        }
    }
}

/// A meter reporting an instantaneous value from user-owned state.
pub trait Gauge: Meter {
    /// The current value, or `NaN` once the observed state has been dropped.
    fn value(&self) -> f64;

    /// Returns `true` once the observed state has been dropped.
    fn is_stale(&self) -> bool {
        false
    }
}

/// A count that the application maintains itself and the meter only reads,
/// such as a cache's eviction total.
pub trait FunctionCounter: Meter {
    /// The current count. Never decreases, and keeps its last value once the
    /// observed state has been dropped. For step meters this is the growth
    /// seen during the last completed window.
    fn count(&self) -> f64;
}

/// Handle to a task started on a [`LongTaskTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongTaskSample(pub u64);

/// A meter tracking tasks that are still in flight.
pub trait LongTaskTimer: Meter {
    /// Marks the start of a task.
    fn start(&self) -> LongTaskSample;

    /// Marks the end of a task, returning how long it ran.
    /// Returns `None` if the sample is unknown or already stopped.
    fn stop(&self, sample: LongTaskSample) -> Option<Duration>;

    /// Number of running tasks.
    fn active_tasks(&self) -> usize;

    /// Sum of the ages of all running tasks.
    fn duration(&self) -> Duration;
}

/// A type-erased handle to any registered meter.
#[derive(Debug, Clone)]
pub enum MeterHandle {
    /// A counter.
    Counter(Arc<dyn Counter>),
    /// A timer.
    Timer(Arc<dyn Timer>),
    /// A distribution summary.
    DistributionSummary(Arc<dyn DistributionSummary>),
    /// A gauge.
    Gauge(Arc<dyn Gauge>),
    /// A long task timer.
    LongTaskTimer(Arc<dyn LongTaskTimer>),
    /// A function counter.
    FunctionCounter(Arc<dyn FunctionCounter>),
    /// A meter with caller-supplied measurements.
    Custom(Arc<dyn Meter>),
}

impl MeterHandle {
    /// Returns the [`MeterType`] of the wrapped meter.
    pub fn meter_type(&self) -> MeterType {
        match self {
            MeterHandle::Counter(_) => MeterType::Counter,
            MeterHandle::Timer(_) => MeterType::Timer,
            MeterHandle::DistributionSummary(_) => MeterType::DistributionSummary,
            MeterHandle::Gauge(_) => MeterType::Gauge,
            MeterHandle::LongTaskTimer(_) => MeterType::LongTaskTimer,
            MeterHandle::FunctionCounter(_) => MeterType::FunctionCounter,
            MeterHandle::Custom(_) => MeterType::Other,
        }
    }

    /// The identity of the wrapped meter.
    pub fn id(&self) -> &MeterId {
        match self {
            MeterHandle::Counter(m) => m.id(),
            MeterHandle::Timer(m) => m.id(),
            MeterHandle::DistributionSummary(m) => m.id(),
            MeterHandle::Gauge(m) => m.id(),
            MeterHandle::LongTaskTimer(m) => m.id(),
            MeterHandle::FunctionCounter(m) => m.id(),
            MeterHandle::Custom(m) => m.id(),
        }
    }

    /// Samples the wrapped meter.
    pub fn measure(&self) -> Vec<Measurement> {
        match self {
            MeterHandle::Counter(m) => m.measure(),
            MeterHandle::Timer(m) => m.measure(),
            MeterHandle::DistributionSummary(m) => m.measure(),
            MeterHandle::Gauge(m) => m.measure(),
            MeterHandle::LongTaskTimer(m) => m.measure(),
            MeterHandle::FunctionCounter(m) => m.measure(),
            MeterHandle::Custom(m) => m.measure(),
        }
    }

    /// Returns the counter if this handle wraps one.
    pub fn as_counter(&self) -> Option<&Arc<dyn Counter>> {
        match self {
            MeterHandle::Counter(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the timer if this handle wraps one.
    pub fn as_timer(&self) -> Option<&Arc<dyn Timer>> {
        match self {
            MeterHandle::Timer(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the summary if this handle wraps one.
    pub fn as_summary(&self) -> Option<&Arc<dyn DistributionSummary>> {
        match self {
            MeterHandle::DistributionSummary(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the gauge if this handle wraps one.
    pub fn as_gauge(&self) -> Option<&Arc<dyn Gauge>> {
        match self {
            MeterHandle::Gauge(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the long task timer if this handle wraps one.
    pub fn as_long_task_timer(&self) -> Option<&Arc<dyn LongTaskTimer>> {
        match self {
            MeterHandle::LongTaskTimer(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the function counter if this handle wraps one.
    pub fn as_function_counter(&self) -> Option<&Arc<dyn FunctionCounter>> {
        match self {
            MeterHandle::FunctionCounter(f) => Some(f),
            _ => None,
        }
    }
}

/// A point-in-time view of one meter, produced for export.
#[derive(Debug, Clone)]
pub struct MeterSnapshot {
    /// The meter's identity.
    pub id: MeterId,
    /// Description and base unit supplied at registration.
    pub metadata: MeterMetadata,
    /// The sampled values.
    pub measurements: Vec<Measurement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedSummary {
        id: MeterId,
    }

    impl Meter for FixedSummary {
        fn id(&self) -> &MeterId {
            &self.id
        }

        fn measure(&self) -> Vec<Measurement> {
            vec![Measurement::new(Statistic::Count, self.count() as f64)]
        }
    }

    impl DistributionSummary for FixedSummary {
        fn record(&self, _amount: f64) {}

        fn count(&self) -> u64 {
            4
        }

        fn total_amount(&self) -> f64 {
            10.0
        }

        fn max(&self) -> f64 {
            4.0
        }
    }

    #[test]
    fn test_summary_mean_default() {
        let summary = FixedSummary {
            id: MeterId::new("payload", MeterType::DistributionSummary),
        };
        assert_eq!(summary.mean(), 2.5);
    }

    #[test]
    fn test_handle_type_dispatch() {
        let handle = MeterHandle::DistributionSummary(Arc::new(FixedSummary {
            id: MeterId::new("payload", MeterType::DistributionSummary),
        }));

        assert_eq!(handle.meter_type(), MeterType::DistributionSummary);
        assert!(handle.as_counter().is_none());
        assert!(handle.as_summary().is_some());
        assert_eq!(handle.id().name, "payload");
        assert_eq!(handle.measure(), vec![Measurement::new(Statistic::Count, 4.0)]);
    }

    #[test]
    fn test_custom_handle_reports_other_type() {
        let handle = MeterHandle::Custom(Arc::new(FixedSummary {
            id: MeterId::new("pool", MeterType::Other),
        }));

        assert_eq!(handle.meter_type(), MeterType::Other);
        assert!(handle.as_function_counter().is_none());
        assert_eq!(handle.measure(), vec![Measurement::new(Statistic::Count, 4.0)]);
    }

    #[test]
    fn test_statistic_tag_values() {
        assert_eq!(Statistic::TotalTime.tag_value(), "totalTime");
        assert_eq!(
            serde_json::to_string(&Statistic::ActiveTasks).unwrap(),
            "\"activeTasks\""
        );
    }
}
