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

//! Gauges observing user-owned state.
//!
//! A gauge never owns what it observes. It holds a [`GaugeFn`] which usually
//! wraps a `Weak` reference (see [`weak_observation`]); once the referent is
//! dropped the gauge reads `NaN`, reports itself stale and is pruned by the
//! registry at the next snapshot.

use meterkit_core::{Gauge, Measurement, Meter, MeterId, Statistic};
use std::fmt::Debug;
use std::sync::Arc;

/// Samples observed state, or `None` once that state is gone.
pub type GaugeFn = Arc<dyn Fn() -> Option<f64> + Send + Sync>;

/// Builds a [`GaugeFn`] that applies `value` to `target` for as long as some
/// other owner keeps `target` alive.
pub fn weak_observation<T, F>(target: &Arc<T>, value: F) -> GaugeFn
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> f64 + Send + Sync + 'static,
{
    let weak = Arc::downgrade(target);
    Arc::new(move || weak.upgrade().map(|target| value(&target)))
}

/// A gauge backed by a [`GaugeFn`].
pub struct ObservedGauge {
    id: MeterId,
    observe: GaugeFn,
}

impl ObservedGauge {
    /// Creates a gauge over `observe`.
    pub fn new(id: MeterId, observe: GaugeFn) -> Self {
        Self { id, observe }
    }
}

impl Debug for ObservedGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedGauge")
            .field("id", &self.id)
            .field("stale", &self.is_stale())
            .finish()
    }
}

impl Meter for ObservedGauge {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Value, self.value())]
    }
}

impl Gauge for ObservedGauge {
    fn value(&self) -> f64 {
        (self.observe)().unwrap_or(f64::NAN)
    }

    fn is_stale(&self) -> bool {
        (self.observe)().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterkit_core::MeterType;
    use std::sync::Mutex;

    #[test]
    fn test_gauge_follows_target() {
        let queue = Arc::new(Mutex::new(vec![1, 2, 3]));
        let gauge = ObservedGauge::new(
            MeterId::new("queue.size", MeterType::Gauge),
            weak_observation(&queue, |q| q.lock().map(|q| q.len()).unwrap_or(0) as f64),
        );

        assert_eq!(gauge.value(), 3.0);
        queue.lock().unwrap().push(4);
        assert_eq!(gauge.value(), 4.0);
        assert!(!gauge.is_stale());
    }

    #[test]
    fn test_gauge_does_not_keep_target_alive() {
        let target = Arc::new(7_u32);
        let gauge = ObservedGauge::new(
            MeterId::new("answer", MeterType::Gauge),
            weak_observation(&target, |v| *v as f64),
        );
        assert_eq!(Arc::strong_count(&target), 1);

        drop(target);
        assert!(gauge.value().is_nan());
        assert!(gauge.is_stale());
    }
}
