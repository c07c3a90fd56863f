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

use meterkit_core::{
    Clock, LongTaskSample, LongTaskTimer, Measurement, Meter, MeterId, Statistic,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::lock;

/// Tracks running tasks by their monotonic start time.
#[derive(Debug)]
pub struct DefaultLongTaskTimer {
    id: MeterId,
    clock: Arc<dyn Clock>,
    next_task: AtomicU64,
    running: Mutex<HashMap<u64, u64>>,
}

impl DefaultLongTaskTimer {
    /// Creates a timer with no running tasks.
    pub fn new(id: MeterId, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            clock,
            next_task: AtomicU64::new(0),
            running: Mutex::new(HashMap::new()),
        }
    }
}

impl Meter for DefaultLongTaskTimer {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![
            Measurement::new(Statistic::ActiveTasks, self.active_tasks() as f64),
            Measurement::new(Statistic::Duration, self.duration().as_secs_f64()),
        ]
    }
}

impl LongTaskTimer for DefaultLongTaskTimer {
    fn start(&self) -> LongTaskSample {
        let task = self.next_task.fetch_add(1, Ordering::Relaxed);
        lock(&self.running).insert(task, self.clock.monotonic_time());
        LongTaskSample(task)
    }

    fn stop(&self, sample: LongTaskSample) -> Option<Duration> {
        let started = lock(&self.running).remove(&sample.0)?;
        let elapsed = self.clock.monotonic_time().saturating_sub(started);
        Some(Duration::from_nanos(elapsed))
    }

    fn active_tasks(&self) -> usize {
        lock(&self.running).len()
    }

    fn duration(&self) -> Duration {
        let now = self.clock.monotonic_time();
        let total: u64 = lock(&self.running)
            .values()
            .map(|started| now.saturating_sub(*started))
            .sum();
        Duration::from_nanos(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterkit_core::{MeterType, MockClock};

    #[test]
    fn test_running_tasks_accumulate_age() {
        let clock = Arc::new(MockClock::new());
        let timer = DefaultLongTaskTimer::new(
            MeterId::new("migration", MeterType::LongTaskTimer),
            clock.clone(),
        );

        let first = timer.start();
        clock.add_seconds(10);
        let second = timer.start();
        clock.add_seconds(5);

        assert_eq!(timer.active_tasks(), 2);
        assert_eq!(timer.duration(), Duration::from_secs(20));

        assert_eq!(timer.stop(first), Some(Duration::from_secs(15)));
        assert_eq!(timer.stop(first), None);
        assert_eq!(timer.active_tasks(), 1);
        assert_eq!(timer.duration(), Duration::from_secs(5));

        assert_eq!(timer.stop(second), Some(Duration::from_secs(5)));
        assert_eq!(timer.measure()[0].value, 0.0);
    }
}
