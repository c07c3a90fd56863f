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

//! Counters.

use meterkit_core::{Clock, Counter, Measurement, Meter, MeterId, Statistic};
use std::sync::Arc;
use std::time::Duration;

use super::{AtomicF64, StepWindow};
use crate::registry::NegativeIncrements;

fn accepts(policy: NegativeIncrements, id: &MeterId, amount: f64) -> bool {
    if amount < 0.0 && policy == NegativeIncrements::Ignore {
        log::trace!("Ignoring negative increment {} on counter {}", amount, id);
        return false;
    }
    true
}

/// A counter whose value grows for the lifetime of the registry.
#[derive(Debug)]
pub struct CumulativeCounter {
    id: MeterId,
    value: AtomicF64,
    negative: NegativeIncrements,
}

impl CumulativeCounter {
    /// Creates a counter starting at zero.
    pub fn new(id: MeterId, negative: NegativeIncrements) -> Self {
        Self {
            id,
            value: AtomicF64::default(),
            negative,
        }
    }
}

impl Meter for CumulativeCounter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }
}

impl Counter for CumulativeCounter {
    fn increment_by(&self, amount: f64) {
        if accepts(self.negative, &self.id, amount) {
            self.value.add(amount);
        }
    }

    fn count(&self) -> f64 {
        self.value.get()
    }
}

/// A counter reporting the total of the last completed step window.
#[derive(Debug)]
pub struct StepCounter {
    id: MeterId,
    window: StepWindow<f64>,
    negative: NegativeIncrements,
}

impl StepCounter {
    /// Creates a counter whose windows are aligned on `clock`.
    pub fn new(
        id: MeterId,
        clock: Arc<dyn Clock>,
        step: Duration,
        negative: NegativeIncrements,
    ) -> Self {
        Self {
            id,
            window: StepWindow::new(clock, step),
            negative,
        }
    }
}

impl Meter for StepCounter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }
}

impl Counter for StepCounter {
    fn increment_by(&self, amount: f64) {
        if accepts(self.negative, &self.id, amount) {
            self.window.update(|total| *total += amount);
        }
    }

    fn count(&self) -> f64 {
        self.window.poll()
    }
}
