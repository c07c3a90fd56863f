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

//! Meters whose measurements come straight from the caller.

use meterkit_core::{Measurement, Meter, MeterId};
use std::sync::Arc;

/// Produces the measurements of a custom meter each time it is sampled.
pub type MeasureFn = Arc<dyn Fn() -> Vec<Measurement> + Send + Sync>;

/// A meter reporting whatever its [`MeasureFn`] returns.
pub struct CustomMeter {
    id: MeterId,
    measure: MeasureFn,
}

impl CustomMeter {
    /// Creates a meter over `measure`.
    pub fn new(id: MeterId, measure: MeasureFn) -> Self {
        Self { id, measure }
    }
}

impl std::fmt::Debug for CustomMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomMeter").field("id", &self.id).finish()
    }
}

impl Meter for CustomMeter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn measure(&self) -> Vec<Measurement> {
        (self.measure)()
    }
}
