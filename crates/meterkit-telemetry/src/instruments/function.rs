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

//! Counters read from user-owned state.
//!
//! Like a gauge, a function counter observes through a [`GaugeFn`] and does
//! not keep its target alive. Unlike a gauge it is never pruned: once the
//! target is dropped it keeps reporting the last count it saw.

use meterkit_core::{Clock, FunctionCounter, Measurement, Meter, MeterId, Statistic};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{lock, GaugeFn, StepWindow};

/// A function counter reporting the highest count observed so far.
pub struct CumulativeFunctionCounter {
    id: MeterId,
    observe: GaugeFn,
    last: Mutex<f64>,
}

impl CumulativeFunctionCounter {
    /// Creates a counter over `observe`.
    pub fn new(id: MeterId, observe: GaugeFn) -> Self {
        Self {
            id,
            observe,
            last: Mutex::new(0.0),
        }
    }
}

impl std::fmt::Debug for CumulativeFunctionCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CumulativeFunctionCounter")
            .field("id", &self.id)
            .field("last", &*lock(&self.last))
            .finish()
    }
}

impl Meter for CumulativeFunctionCounter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }
}

impl FunctionCounter for CumulativeFunctionCounter {
    fn count(&self) -> f64 {
        let mut last = lock(&self.last);
        match (self.observe)() {
            Some(seen) if seen > *last => *last = seen,
            Some(seen) if seen < *last => {
                log::trace!("Ignoring decrease to {} on function counter {}", seen, self.id);
            }
            _ => {}
        }
        *last
    }
}

/// A function counter reporting how much the observed count grew during the
/// last completed step window.
///
/// Growth is credited to the window in progress when it is observed, so a
/// count is only seen by the window of the read that noticed it.
pub struct StepFunctionCounter {
    id: MeterId,
    observe: GaugeFn,
    last: Mutex<f64>,
    window: StepWindow<f64>,
}

impl StepFunctionCounter {
    /// Creates a counter whose windows are aligned on `clock`.
    pub fn new(id: MeterId, observe: GaugeFn, clock: Arc<dyn Clock>, step: Duration) -> Self {
        Self {
            id,
            observe,
            last: Mutex::new(0.0),
            window: StepWindow::new(clock, step),
        }
    }
}

impl std::fmt::Debug for StepFunctionCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepFunctionCounter")
            .field("id", &self.id)
            .field("step", &self.window.step())
            .finish()
    }
}

impl Meter for StepFunctionCounter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }
}

impl FunctionCounter for StepFunctionCounter {
    fn count(&self) -> f64 {
        let mut last = lock(&self.last);
        if let Some(seen) = (self.observe)() {
            let growth = seen - *last;
            if growth > 0.0 {
                self.window.update(|total| *total += growth);
                *last = seen;
            }
        }
        drop(last);
        self.window.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::weak_observation;
    use meterkit_core::{MeterType, MockClock};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn id() -> MeterId {
        MeterId::new("cache.evictions", MeterType::FunctionCounter)
    }

    #[test]
    fn test_cumulative_follows_target_and_never_decreases() {
        let evictions = Arc::new(AtomicU64::new(3));
        let counter = CumulativeFunctionCounter::new(
            id(),
            weak_observation(&evictions, |e| e.load(Ordering::Relaxed) as f64),
        );

        assert_eq!(counter.count(), 3.0);
        evictions.store(10, Ordering::Relaxed);
        assert_eq!(counter.count(), 10.0);
        evictions.store(4, Ordering::Relaxed);
        assert_eq!(counter.count(), 10.0);
        assert_eq!(counter.measure(), vec![Measurement::new(Statistic::Count, 10.0)]);
    }

    #[test]
    fn test_cumulative_keeps_last_count_after_target_drop() {
        let evictions = Arc::new(AtomicU64::new(7));
        let counter = CumulativeFunctionCounter::new(
            id(),
            weak_observation(&evictions, |e| e.load(Ordering::Relaxed) as f64),
        );
        assert_eq!(counter.count(), 7.0);
        assert_eq!(Arc::strong_count(&evictions), 1);

        drop(evictions);
        assert_eq!(counter.count(), 7.0);
    }

    #[test]
    fn test_step_reports_growth_per_window() {
        let clock = Arc::new(MockClock::new());
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = StepFunctionCounter::new(
            id(),
            weak_observation(&evictions, |e| e.load(Ordering::Relaxed) as f64),
            clock.clone(),
            Duration::from_secs(60),
        );

        evictions.store(5, Ordering::Relaxed);
        assert_eq!(counter.count(), 0.0);

        clock.add(Duration::from_secs(60));
        evictions.store(8, Ordering::Relaxed);
        assert_eq!(counter.count(), 5.0);

        clock.add(Duration::from_secs(60));
        assert_eq!(counter.count(), 3.0);

        clock.add(Duration::from_secs(60));
        assert_eq!(counter.count(), 0.0);
    }
}
