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

//! Process-wide access to a shared [`CompositeMeterRegistry`].
//!
//! Library code records through these functions without being handed a
//! registry; the application decides where the values go by adding child
//! registries. Until a child is added every meter is a no-op.

use meterkit_core::{Counter, DistributionSummary, LongTaskTimer, Measurement, Meter, Tags, Timer};
use std::sync::{Arc, RwLock};

use crate::instruments::{read, write};
use crate::registry::{CompositeMeterRegistry, MeterRegistry, MeterRegistryExt};

static GLOBAL: RwLock<Option<Arc<CompositeMeterRegistry>>> = RwLock::new(None);

/// The global composite, created on first use.
pub fn registry() -> Arc<CompositeMeterRegistry> {
    if let Some(global) = read(&GLOBAL).as_ref() {
        return global.clone();
    }
    write(&GLOBAL)
        .get_or_insert_with(|| {
            log::debug!("Creating global meter registry");
            Arc::new(CompositeMeterRegistry::default())
        })
        .clone()
}

/// Installs `composite` as the global registry unless one already exists.
/// Returns the registry that is global afterwards.
pub fn install(composite: Arc<CompositeMeterRegistry>) -> Arc<CompositeMeterRegistry> {
    let mut global = write(&GLOBAL);
    match global.as_ref() {
        Some(existing) => {
            log::warn!("A global meter registry is already installed; keeping it");
            existing.clone()
        }
        None => {
            *global = Some(composite.clone());
            composite
        }
    }
}

/// Drops the global registry. The next call to [`registry`] starts afresh;
/// handles obtained before the reset keep pointing at the old one.
pub fn reset() -> Option<Arc<CompositeMeterRegistry>> {
    write(&GLOBAL).take()
}

/// Adds a child to the global registry.
pub fn add_registry(child: Arc<dyn MeterRegistry>) -> bool {
    registry().add_registry(child)
}

/// Removes a child from the global registry.
pub fn remove_registry(child: &Arc<dyn MeterRegistry>) -> bool {
    registry().remove_registry(child)
}

/// A counter on the global registry.
pub fn counter(name: &str, tags: impl Into<Tags>) -> Arc<dyn Counter> {
    registry().counter(name, tags)
}

/// A timer on the global registry.
pub fn timer(name: &str, tags: impl Into<Tags>) -> Arc<dyn Timer> {
    registry().timer(name, tags)
}

/// A distribution summary on the global registry.
pub fn summary(name: &str, tags: impl Into<Tags>) -> Arc<dyn DistributionSummary> {
    registry().summary(name, tags)
}

/// A long task timer on the global registry.
pub fn long_task_timer(name: &str, tags: impl Into<Tags>) -> Arc<dyn LongTaskTimer> {
    registry().long_task_timer(name, tags)
}

/// A gauge on the global registry observing `target`, which is handed back.
pub fn gauge<T, F>(name: &str, tags: impl Into<Tags>, target: Arc<T>, value: F) -> Arc<T>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> f64 + Send + Sync + 'static,
{
    registry().gauge(name, tags, target, value)
}

/// A function counter on the global registry reading `target`, which is
/// handed back.
pub fn function_counter<T, F>(name: &str, tags: impl Into<Tags>, target: Arc<T>, count: F) -> Arc<T>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> f64 + Send + Sync + 'static,
{
    registry().function_counter(name, tags, target, count)
}

/// Registers a meter with caller-supplied measurements on the global
/// registry.
pub fn register<F>(name: &str, tags: impl Into<Tags>, measure: F) -> Arc<dyn Meter>
where
    F: Fn() -> Vec<Measurement> + Send + Sync + 'static,
{
    registry().custom(name, tags, measure)
}
