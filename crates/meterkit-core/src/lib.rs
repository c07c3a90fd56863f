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

//! # Meterkit Core
//!
//! Foundational crate containing the meter contracts, identity types, clocks
//! and configuration primitives shared by every registry and exporter.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod meter;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{check_all, Check, ConfigSource, PropertyCheck, ValidationResult, Validated};
pub use error::{MetricsError, MetricsResult};
pub use meter::{
    Counter, DistributionSummary, FunctionCounter, Gauge, LongTaskSample, LongTaskTimer,
    Measurement, Meter, MeterHandle, MeterId, MeterMetadata, MeterSnapshot, MeterType, Statistic,
    Tag, Tags, Timer,
};
