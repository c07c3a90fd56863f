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

//! Step (windowed) aggregation.
//!
//! Time is cut into fixed windows of length `step`, aligned to multiples of
//! `step` on the clock's monotonic scale. Updates accumulate into the current
//! window; reads return the value of the last *completed* window. Rollover is
//! lazy: it happens on whichever read or write first observes that the clock
//! has crossed a boundary.
//!
//! ```text
//!  |---- window n ----|---- window n+1 ----|
//!    inc(1) inc(2)        read -> 3
//! ```
//!
//! When more than one boundary has passed since the last access, the window
//! just before `now` saw no updates, so the reported value is the empty value.

use meterkit_core::Clock;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::lock;

#[derive(Debug)]
struct WindowState<T> {
    start: u64,
    current: T,
    previous: T,
}

/// A per-meter step accumulator over any value with an empty state.
///
/// The clock read, the rollover and the update all happen under one lock, so
/// concurrent updates are never lost and a read never mixes two windows.
#[derive(Debug)]
pub struct StepWindow<T> {
    clock: Arc<dyn Clock>,
    step_nanos: u64,
    state: Mutex<WindowState<T>>,
}

impl<T: Default + Clone + Debug> StepWindow<T> {
    /// Creates a window aligned to the clock's current step boundary.
    pub fn new(clock: Arc<dyn Clock>, step: Duration) -> Self {
        let step_nanos = u64::try_from(step.as_nanos()).unwrap_or(u64::MAX).max(1);
        let now = clock.monotonic_time();
        Self {
            clock,
            step_nanos,
            state: Mutex::new(WindowState {
                start: now - now % step_nanos,
                current: T::default(),
                previous: T::default(),
            }),
        }
    }

    /// The window length.
    pub fn step(&self) -> Duration {
        Duration::from_nanos(self.step_nanos)
    }

    fn roll(&self, state: &mut WindowState<T>) {
        let now = self.clock.monotonic_time();
        if now < state.start {
            return;
        }
        let elapsed_windows = (now - state.start) / self.step_nanos;
        match elapsed_windows {
            0 => {}
            1 => state.previous = std::mem::take(&mut state.current),
            _ => {
                state.previous = T::default();
                state.current = T::default();
            }
        }
        state.start += elapsed_windows * self.step_nanos;
    }

    /// Applies `update` to the current window, rolling over first if needed.
    pub fn update(&self, update: impl FnOnce(&mut T)) {
        let mut state = lock(&self.state);
        self.roll(&mut state);
        update(&mut state.current);
    }

    /// Returns the value of the last completed window.
    pub fn poll(&self) -> T {
        let mut state = lock(&self.state);
        self.roll(&mut state);
        state.previous.clone()
    }

    /// Returns the partial value of the window in progress.
    pub fn current(&self) -> T {
        let mut state = lock(&self.state);
        self.roll(&mut state);
        state.current.clone()
    }
}
