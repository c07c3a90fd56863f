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

//! Timers and distribution summaries.
//!
//! Both track the same three values (count, total, max) and differ only in
//! the unit of what they record.

use meterkit_core::{
    Clock, DistributionSummary, Measurement, Meter, MeterId, Statistic, Timer,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{lock, StepWindow};
use crate::registry::CountingMode;

const NANOS_PER_SECOND: f64 = 1e9;

/// Count, total and max of a stream of amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distribution {
    /// Number of recorded amounts.
    pub count: u64,
    /// Sum of recorded amounts.
    pub total: f64,
    /// Largest recorded amount.
    pub max: f64,
}

impl Distribution {
    fn record(&mut self, amount: f64) {
        self.count += 1;
        self.total += amount;
        if amount > self.max {
            self.max = amount;
        }
    }
}

#[derive(Debug)]
enum DistributionState {
    Cumulative(Mutex<Distribution>),
    Step(StepWindow<Distribution>),
}

impl DistributionState {
    fn new(mode: CountingMode, clock: &Arc<dyn Clock>) -> Self {
        match mode {
            CountingMode::Cumulative => DistributionState::Cumulative(Mutex::default()),
            CountingMode::Step(step) => {
                DistributionState::Step(StepWindow::new(clock.clone(), step))
            }
        }
    }

    fn record(&self, amount: f64) {
        match self {
            DistributionState::Cumulative(state) => lock(state).record(amount),
            DistributionState::Step(window) => window.update(|d| d.record(amount)),
        }
    }

    fn snapshot(&self) -> Distribution {
        match self {
            DistributionState::Cumulative(state) => *lock(state),
            DistributionState::Step(window) => window.poll(),
        }
    }
}

/// The timer used by the simple registry, in either counting mode.
#[derive(Debug)]
pub struct DefaultTimer {
    id: MeterId,
    clock: Arc<dyn Clock>,
    state: DistributionState,
}

impl DefaultTimer {
    /// Creates an empty timer.
    pub fn new(id: MeterId, clock: Arc<dyn Clock>, mode: CountingMode) -> Self {
        let state = DistributionState::new(mode, &clock);
        Self { id, clock, state }
    }
}

impl Meter for DefaultTimer {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        let d = self.state.snapshot();
        vec![
            Measurement::new(Statistic::Count, d.count as f64),
            Measurement::new(Statistic::TotalTime, d.total / NANOS_PER_SECOND),
            Measurement::new(Statistic::Max, d.max / NANOS_PER_SECOND),
        ]
    }
}

impl Timer for DefaultTimer {
    fn record(&self, duration: Duration) {
        self.state.record(duration.as_nanos() as f64);
    }

    fn count(&self) -> u64 {
        self.state.snapshot().count
    }

    fn total_time(&self) -> Duration {
        Duration::from_nanos(self.state.snapshot().total as u64)
    }

    fn max(&self) -> Duration {
        Duration::from_nanos(self.state.snapshot().max as u64)
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

/// The distribution summary used by the simple registry.
#[derive(Debug)]
pub struct DefaultSummary {
    id: MeterId,
    state: DistributionState,
}

impl DefaultSummary {
    /// Creates an empty summary.
    pub fn new(id: MeterId, clock: Arc<dyn Clock>, mode: CountingMode) -> Self {
        let state = DistributionState::new(mode, &clock);
        Self { id, state }
    }
}

impl Meter for DefaultSummary {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        let d = self.state.snapshot();
        vec![
            Measurement::new(Statistic::Count, d.count as f64),
            Measurement::new(Statistic::Total, d.total),
            Measurement::new(Statistic::Max, d.max),
        ]
    }
}

impl DistributionSummary for DefaultSummary {
    fn record(&self, amount: f64) {
        if amount < 0.0 || amount.is_nan() {
            return;
        }
        self.state.record(amount);
    }

    fn count(&self) -> u64 {
        self.state.snapshot().count
    }

    fn total_amount(&self) -> f64 {
        self.state.snapshot().total
    }

    fn max(&self) -> f64 {
        self.state.snapshot().max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meterkit_core::{MeterType, MockClock};

    #[test]
    fn test_cumulative_timer() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new());
        let timer = DefaultTimer::new(
            MeterId::new("render", MeterType::Timer),
            clock,
            CountingMode::Cumulative,
        );

        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(30));

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.total_time(), Duration::from_millis(40));
        assert_eq!(timer.max(), Duration::from_millis(30));
        assert_eq!(timer.mean(), Duration::from_millis(20));

        let measured = timer.measure();
        assert_relative_eq!(measured[1].value, 0.04, epsilon = 1e-9);
        assert_relative_eq!(measured[2].value, 0.03, epsilon = 1e-9);
    }

    #[test]
    fn test_record_with_uses_timer_clock() {
        let clock = Arc::new(MockClock::new());
        let timer: Arc<dyn Timer> = Arc::new(DefaultTimer::new(
            MeterId::new("load", MeterType::Timer),
            clock.clone(),
            CountingMode::Cumulative,
        ));

        let answer = timer.record_with(|| {
            clock.add(Duration::from_millis(250));
            42
        });

        assert_eq!(answer, 42);
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.total_time(), Duration::from_millis(250));
    }

    #[test]
    fn test_step_summary_rolls_all_statistics() {
        let clock = Arc::new(MockClock::new());
        let summary = DefaultSummary::new(
            MeterId::new("payload", MeterType::DistributionSummary),
            clock.clone(),
            CountingMode::Step(Duration::from_secs(10)),
        );

        summary.record(100.0);
        summary.record(300.0);
        summary.record(-5.0);
        assert_eq!(summary.count(), 0);

        clock.add_seconds(10);
        assert_eq!(summary.count(), 2);
        assert_relative_eq!(summary.total_amount(), 400.0);
        assert_relative_eq!(summary.max(), 300.0);
        assert_relative_eq!(summary.mean(), 200.0);

        summary.record(1.0);
        clock.add_seconds(10);
        assert_eq!(summary.count(), 1);
        assert_relative_eq!(summary.max(), 1.0);
    }
}
