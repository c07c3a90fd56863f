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

//! Registry construction options.
//!
//! Reads the `simple.*` properties:
//!
//! | key                         | values                | default      |
//! |-----------------------------|-----------------------|--------------|
//! | `simple.mode`               | `cumulative`, `step`  | `cumulative` |
//! | `simple.step`               | duration              | `1m`         |
//! | `simple.negativeIncrements` | `allow`, `ignore`     | `ignore`     |

use meterkit_core::config::{parse_duration, DurationValue};
use meterkit_core::{check_all, ConfigSource, MetricsResult, PropertyCheck, ValidationResult};
use std::fmt::Display;
use std::time::Duration;

/// Default step window.
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

/// How counters, timers and summaries aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountingMode {
    /// Values accumulate for the lifetime of the registry.
    #[default]
    Cumulative,
    /// Values are reported per completed window of the given length.
    Step(Duration),
}

/// What a counter does with a negative increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeIncrements {
    /// Apply it like any other amount.
    Allow,
    /// Drop it silently.
    #[default]
    Ignore,
}

/// Behaviour a registry decides once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryCapabilities {
    /// Negative counter increments policy.
    pub negative_increments: NegativeIncrements,
}

/// Construction options of a [`SimpleMeterRegistry`](super::SimpleMeterRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// Aggregation mode.
    pub mode: CountingMode,
    /// Capabilities of the created meters.
    pub capabilities: RegistryCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeName {
    Cumulative,
    Step,
}

impl Display for ModeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeName::Cumulative => write!(f, "cumulative"),
            ModeName::Step => write!(f, "step"),
        }
    }
}

fn parse_mode(raw: &str) -> Result<ModeName, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cumulative" => Ok(ModeName::Cumulative),
        "step" => Ok(ModeName::Step),
        _ => Err("must be one of cumulative, step".to_string()),
    }
}

impl Display for NegativeIncrements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegativeIncrements::Allow => write!(f, "allow"),
            NegativeIncrements::Ignore => write!(f, "ignore"),
        }
    }
}

fn parse_negative(raw: &str) -> Result<NegativeIncrements, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "allow" => Ok(NegativeIncrements::Allow),
        "ignore" => Ok(NegativeIncrements::Ignore),
        _ => Err("must be one of allow, ignore".to_string()),
    }
}

impl RegistryConfig {
    /// A step registry with the default capabilities.
    pub fn step(step: Duration) -> Self {
        Self {
            mode: CountingMode::Step(step),
            ..Self::default()
        }
    }

    /// Validates the `simple.*` properties of `source`.
    pub fn validate<S: ConfigSource + ?Sized>(source: &S) -> ValidationResult {
        let mode: PropertyCheck<S, ModeName> = PropertyCheck::lookup("simple.mode", parse_mode);
        let step: PropertyCheck<S, DurationValue> =
            PropertyCheck::lookup("simple.step", DurationValue::parse)
                .invalidate_when(|d| d.0.is_zero(), "must be positive");
        let negative: PropertyCheck<S, NegativeIncrements> =
            PropertyCheck::lookup("simple.negativeIncrements", parse_negative);
        check_all(source, &[&mode, &step, &negative])
    }

    /// Reads the configuration, falling back to defaults for anything missing
    /// or malformed. Each invalid property is logged.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Self {
        for failure in Self::validate(source).failures() {
            log::warn!("Ignoring invalid registry property: {}", failure);
        }
        Self::resolve(source)
    }

    /// Reads the configuration, failing on the first invalid property set.
    pub fn try_from_source<S: ConfigSource + ?Sized>(source: &S) -> MetricsResult<Self> {
        Self::validate(source).or_fail()?;
        Ok(Self::resolve(source))
    }

    fn resolve<S: ConfigSource + ?Sized>(source: &S) -> Self {
        let step = source
            .get("simple.step")
            .and_then(|raw| parse_duration(&raw).ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_STEP);
        let mode = match source.get("simple.mode").and_then(|raw| parse_mode(&raw).ok()) {
            Some(ModeName::Step) => CountingMode::Step(step),
            _ => CountingMode::Cumulative,
        };
        let negative_increments = source
            .get("simple.negativeIncrements")
            .and_then(|raw| parse_negative(&raw).ok())
            .unwrap_or_default();

        Self {
            mode,
            capabilities: RegistryCapabilities {
                negative_increments,
            },
        }
    }
}
