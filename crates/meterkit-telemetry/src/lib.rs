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

//! # Meterkit Telemetry
//!
//! Concrete instruments, the simple and composite registries, the
//! process-wide facade and the batching push exporter.

#![warn(missing_docs)]

pub mod export;
pub mod global;
pub mod instruments;
pub mod registry;

pub use export::{
    CloudWatchConfig, InMemorySink, JsonLinesSink, LogSink, MetricsSink, PublishReport,
    PushExporter, StepConfig, StepRegistryConfig,
};
pub use registry::{
    CompositeMeterRegistry, CountingMode, MeterRegistry, MeterRegistryExt, RegistryConfig,
    SimpleMeterRegistry,
};

pub use meterkit_core;
