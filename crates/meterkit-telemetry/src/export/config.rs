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

//! Push exporter configuration.
//!
//! Properties are read from a [`ConfigSource`] under a prefix:
//!
//! | key                    | type     | default   |
//! |------------------------|----------|-----------|
//! | `<prefix>.step`        | duration | `1m`      |
//! | `<prefix>.enabled`     | boolean  | `true`    |
//! | `<prefix>.batchSize`   | integer  | `10000`   |
//! | `<prefix>.readTimeout` | duration | `10s`     |
//! | `<prefix>.namespace`   | string   | none      |
//!
//! Every accessor is a default trait method, so an implementation can
//! override any of them. Validation checks the accessors, not just the raw
//! properties, so an override that breaks a backend limit is still reported.

use meterkit_core::config::{parse_bool, parse_duration, parse_integer, DurationValue};
use meterkit_core::{check_all, ConfigSource, PropertyCheck, ValidationResult};
use std::time::Duration;

/// The most data points the cloud backend accepts in one request.
pub const MAX_BATCH_SIZE: usize = 20;

/// Default `batchSize` of a generic push backend.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default `step`.
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

/// Default `readTimeout`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

fn key(prefix: &str, property: &str) -> String {
    format!("{prefix}.{property}")
}

fn lookup<C, T>(
    config: &C,
    prefix: &str,
    property: &str,
    parse: fn(&str) -> Result<T, String>,
) -> Option<T>
where
    C: ConfigSource + ?Sized,
{
    config
        .get(&key(prefix, property))
        .and_then(|raw| parse(&raw).ok())
}

fn step_of<C: ConfigSource + ?Sized>(config: &C, prefix: &str) -> Duration {
    lookup(config, prefix, "step", parse_duration)
        .filter(|step| !step.is_zero())
        .unwrap_or(DEFAULT_STEP)
}

fn enabled_of<C: ConfigSource + ?Sized>(config: &C, prefix: &str) -> bool {
    lookup(config, prefix, "enabled", parse_bool).unwrap_or(true)
}

fn read_timeout_of<C: ConfigSource + ?Sized>(config: &C, prefix: &str) -> Duration {
    lookup(config, prefix, "readTimeout", parse_duration).unwrap_or(DEFAULT_READ_TIMEOUT)
}

fn batch_size_of<C: ConfigSource + ?Sized>(config: &C, prefix: &str) -> Option<usize> {
    lookup(config, prefix, "batchSize", parse_integer)
        .filter(|size| *size >= 1)
        .map(|size| size as usize)
}

/// Checks the raw step-registry properties under `prefix`: each present
/// value must parse, `step` must be positive and `batchSize` at least one.
pub fn validate_step_properties<C: ConfigSource + ?Sized>(
    config: &C,
    prefix: &str,
) -> ValidationResult {
    let step: PropertyCheck<C, DurationValue> =
        PropertyCheck::lookup(key(prefix, "step"), DurationValue::parse)
            .invalidate_when(|d| d.0.is_zero(), "must be positive");
    let enabled: PropertyCheck<C, bool> = PropertyCheck::lookup(key(prefix, "enabled"), parse_bool);
    let batch_size: PropertyCheck<C, i64> =
        PropertyCheck::lookup(key(prefix, "batchSize"), parse_integer).min(1);
    let read_timeout: PropertyCheck<C, DurationValue> =
        PropertyCheck::lookup(key(prefix, "readTimeout"), DurationValue::parse);
    check_all(config, &[&step, &enabled, &batch_size, &read_timeout])
}

/// Configuration of a registry pushing one batch series per step.
pub trait StepRegistryConfig: ConfigSource + Send + Sync {
    /// The property prefix, e.g. `cloudwatch`.
    fn prefix(&self) -> &str;

    /// The backend namespace points are published under.
    fn namespace(&self) -> Option<String> {
        self.get(&key(self.prefix(), "namespace"))
    }

    /// How often to publish.
    fn step(&self) -> Duration {
        step_of(self, self.prefix())
    }

    /// Whether publishing happens at all.
    fn enabled(&self) -> bool {
        enabled_of(self, self.prefix())
    }

    /// Points per request.
    fn batch_size(&self) -> usize {
        batch_size_of(self, self.prefix()).unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// A hard backend limit on points per request, if any.
    fn batch_size_ceiling(&self) -> Option<usize> {
        None
    }

    /// Deadline for each publish request.
    fn read_timeout(&self) -> Duration {
        read_timeout_of(self, self.prefix())
    }

    /// Checks the configuration without failing.
    fn validate(&self) -> ValidationResult {
        validate_step_properties(self, self.prefix())
    }
}

/// A [`StepRegistryConfig`] over any source with a caller-chosen prefix.
#[derive(Debug, Clone)]
pub struct StepConfig<S> {
    prefix: String,
    source: S,
}

impl<S> StepConfig<S> {
    /// Reads properties under `prefix` from `source`.
    pub fn new(prefix: impl Into<String>, source: S) -> Self {
        Self {
            prefix: prefix.into(),
            source,
        }
    }
}

impl<S: ConfigSource> ConfigSource for StepConfig<S> {
    fn get(&self, key: &str) -> Option<String> {
        self.source.get(key)
    }
}

impl<S: ConfigSource + Send + Sync> StepRegistryConfig for StepConfig<S> {
    fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Configuration of the cloud monitoring backend.
///
/// `namespace` is required. `batchSize` defaults to and is capped at
/// [`MAX_BATCH_SIZE`]; an override of [`CloudWatchConfig::batch_size`]
/// returning more is reported by [`CloudWatchConfig::validate`].
///
/// Every `CloudWatchConfig` is also a [`StepRegistryConfig`].
pub trait CloudWatchConfig: ConfigSource + Send + Sync {
    /// The property prefix.
    fn prefix(&self) -> &str {
        "cloudwatch"
    }

    /// The metric namespace.
    fn namespace(&self) -> Option<String> {
        self.get(&key(CloudWatchConfig::prefix(self), "namespace"))
    }

    /// Points per request, never more than [`MAX_BATCH_SIZE`].
    fn batch_size(&self) -> usize {
        batch_size_of(self, CloudWatchConfig::prefix(self))
            .unwrap_or(MAX_BATCH_SIZE)
            .min(MAX_BATCH_SIZE)
    }

    /// How often to publish.
    fn step(&self) -> Duration {
        step_of(self, CloudWatchConfig::prefix(self))
    }

    /// Whether publishing happens at all.
    fn enabled(&self) -> bool {
        enabled_of(self, CloudWatchConfig::prefix(self))
    }

    /// Deadline for each publish request.
    fn read_timeout(&self) -> Duration {
        read_timeout_of(self, CloudWatchConfig::prefix(self))
    }

    /// Checks the step properties, then that a namespace is set and the
    /// effective batch size respects the backend limit.
    fn validate(&self) -> ValidationResult {
        let prefix = CloudWatchConfig::prefix(self);
        let step = |c: &Self| validate_step_properties(c, CloudWatchConfig::prefix(c));
        let namespace: PropertyCheck<Self, String> =
            PropertyCheck::new(key(prefix, "namespace"), |c: &Self| {
                CloudWatchConfig::namespace(c)
            })
            .required();
        let batch_size: PropertyCheck<Self, usize> =
            PropertyCheck::new(key(prefix, "batchSize"), |c: &Self| {
                Some(CloudWatchConfig::batch_size(c))
            })
            .max(MAX_BATCH_SIZE);
        check_all(self, &[&step, &namespace, &batch_size])
    }
}

impl<T: CloudWatchConfig + ?Sized> StepRegistryConfig for T {
    fn prefix(&self) -> &str {
        CloudWatchConfig::prefix(self)
    }

    fn namespace(&self) -> Option<String> {
        CloudWatchConfig::namespace(self)
    }

    fn step(&self) -> Duration {
        CloudWatchConfig::step(self)
    }

    fn enabled(&self) -> bool {
        CloudWatchConfig::enabled(self)
    }

    fn batch_size(&self) -> usize {
        CloudWatchConfig::batch_size(self)
    }

    fn batch_size_ceiling(&self) -> Option<usize> {
        Some(MAX_BATCH_SIZE)
    }

    fn read_timeout(&self) -> Duration {
        CloudWatchConfig::read_timeout(self)
    }

    fn validate(&self) -> ValidationResult {
        CloudWatchConfig::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Props(HashMap<String, String>);

    impl Props {
        fn of(pairs: &[(&str, &str)]) -> Self {
            Props(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigSource for Props {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    impl CloudWatchConfig for Props {}

    struct Overridden;

    impl ConfigSource for Overridden {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
    }

    impl CloudWatchConfig for Overridden {
        fn namespace(&self) -> Option<String> {
            Some("name".to_string())
        }

        fn batch_size(&self) -> usize {
            MAX_BATCH_SIZE * 2
        }
    }

    #[test]
    fn test_batch_size_above_limit_without_namespace() {
        let config = Props::of(&[("cloudwatch.batchSize", "40")]);

        let result = CloudWatchConfig::validate(&config);
        assert!(!result.is_valid());
        assert_eq!(result.failure_messages(), vec!["is required"]);
        assert_eq!(CloudWatchConfig::batch_size(&config), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_overridden_batch_size_is_reported() {
        let result = CloudWatchConfig::validate(&Overridden);
        assert!(!result.is_valid());
        assert_eq!(
            result.failure_messages(),
            vec!["cannot be greater than 20"]
        );
    }

    #[test]
    fn test_namespace_only_is_valid() {
        let config = Props::of(&[("cloudwatch.namespace", "name")]);
        assert!(CloudWatchConfig::validate(&config).is_valid());
        assert_eq!(CloudWatchConfig::batch_size(&config), MAX_BATCH_SIZE);
        assert_eq!(CloudWatchConfig::step(&config), DEFAULT_STEP);
        assert!(CloudWatchConfig::enabled(&config));
    }

    #[test]
    fn test_malformed_step_properties() {
        let config = Props::of(&[
            ("cloudwatch.namespace", "name"),
            ("cloudwatch.step", "often"),
            ("cloudwatch.enabled", "maybe"),
            ("cloudwatch.batchSize", "0"),
        ]);
        let result = CloudWatchConfig::validate(&config);
        assert_eq!(
            result.failure_messages(),
            vec!["must be a duration", "must be a boolean", "must be at least 1"]
        );
        // Accessors fall back to defaults.
        assert_eq!(CloudWatchConfig::step(&config), DEFAULT_STEP);
        assert_eq!(CloudWatchConfig::batch_size(&config), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_cloud_config_is_a_step_config() {
        let config: &dyn StepRegistryConfig = &Overridden;
        assert_eq!(config.prefix(), "cloudwatch");
        assert_eq!(config.namespace().as_deref(), Some("name"));
        assert_eq!(config.batch_size(), 40);
        assert_eq!(config.batch_size_ceiling(), Some(MAX_BATCH_SIZE));
        assert_eq!(config.validate().failure_messages(), vec!["cannot be greater than 20"]);
    }

    #[test]
    fn test_generic_step_config() {
        let source: HashMap<String, String> = [
            ("influx.step", "10s"),
            ("influx.batchSize", "500"),
            ("influx.enabled", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let config = StepConfig::new("influx", source);

        assert_eq!(config.step(), Duration::from_secs(10));
        assert_eq!(config.batch_size(), 500);
        assert!(!config.enabled());
        assert_eq!(config.read_timeout(), DEFAULT_READ_TIMEOUT);
        assert_eq!(config.batch_size_ceiling(), None);
        assert!(config.validate().is_valid());
    }
}
