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

//! Time sources for meters.
//!
//! Every registry is built around an injected [`Clock`] rather than sampling
//! the system time directly. Step aggregation, timers and long task timers all
//! read time through it, which is what lets tests drive window rollover with a
//! [`MockClock`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of wall and monotonic time.
pub trait Clock: Send + Sync + Debug + 'static {
    /// Milliseconds since the UNIX epoch. Used to timestamp exported data.
    fn wall_time(&self) -> u64;

    /// Nanoseconds since an arbitrary, fixed origin. Never goes backwards.
    fn monotonic_time(&self) -> u64;
}

/// The production clock, backed by [`Instant`] and [`SystemTime`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose monotonic origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_time(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// A manually advanced clock for deterministic tests.
///
/// Wall time and monotonic time move together: the wall time is the
/// monotonic reading expressed in milliseconds.
#[derive(Debug, Default)]
pub struct MockClock {
    nanos: AtomicU64,
}

impl MockClock {
    /// Creates a clock stopped at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock stopped at `start`.
    pub fn starting_at(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos() as u64),
        }
    }

    /// Moves the clock forward and returns the new monotonic reading.
    pub fn add(&self, amount: Duration) -> u64 {
        let delta = amount.as_nanos() as u64;
        self.nanos.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// Shorthand for `add(Duration::from_secs(secs))`.
    pub fn add_seconds(&self, secs: u64) -> u64 {
        self.add(Duration::from_secs(secs))
    }
}

impl Clock for MockClock {
    fn wall_time(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst) / 1_000_000
    }

    fn monotonic_time(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
