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

//! Configuration sources and property parsing.
//!
//! Configuration is a flat namespace of dotted keys (`cloudwatch.batchSize`)
//! resolved through [`ConfigSource::get`]. Sources are read-only; typed
//! accessors and their validation are layered on top by the config traits of
//! each registry.

pub mod validate;

pub use self::validate::{check_all, Check, PropertyCheck, Validated, ValidationResult};

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// A read-only lookup of configuration properties by dotted key.
pub trait ConfigSource {
    /// Returns the raw value of `key`, or `None` when it is not set.
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Adapts a lookup closure into a [`ConfigSource`].
#[derive(Debug, Clone)]
pub struct FnSource<F>(pub F);

impl<F> ConfigSource for FnSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }
}

/// Resolves properties from process environment variables.
///
/// `cloudwatch.batchSize` is looked up as `CLOUDWATCH_BATCHSIZE`, preceded by
/// the optional prefix (`APP_CLOUDWATCH_BATCHSIZE`).
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
}

impl EnvSource {
    /// Reads variables without a prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads variables named `<prefix>_<KEY>`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// The environment variable name for a dotted key.
    pub fn variable_name(&self, key: &str) -> String {
        let base = key.replace(['.', '-'], "_").to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), base),
            None => base,
        }
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

/// Resolves properties from a JSON document.
///
/// A dotted key is first looked up verbatim at the top level, then as a path
/// through nested objects, so both `{"cloudwatch.namespace": "x"}` and
/// `{"cloudwatch": {"namespace": "x"}}` work. Scalars are returned in their
/// textual form; objects, arrays and nulls count as absent.
#[derive(Debug, Clone)]
pub struct JsonSource {
    root: serde_json::Value,
}

impl JsonSource {
    /// Wraps an already parsed document.
    pub fn new(root: serde_json::Value) -> Self {
        Self { root }
    }

    /// Parses a JSON document.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    fn scalar(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl ConfigSource for JsonSource {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.root.get(key) {
            return Self::scalar(value);
        }
        key.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
            .and_then(Self::scalar)
    }
}

/// Parses a signed integer property.
pub fn parse_integer(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse()
        .map_err(|_| "must be an integer".to_string())
}

/// Parses a boolean property (`true`/`false`, case-insensitive).
pub fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("must be a boolean".to_string()),
    }
}

/// Parses a duration property such as `500ms`, `10s`, `1m`, `2h` or `1d`.
/// A bare number is read as milliseconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| "must be a duration".to_string())?;

    let seconds = |per_unit: u64| amount.checked_mul(per_unit).map(Duration::from_secs);
    let duration = match unit.trim() {
        "" | "ms" => Some(Duration::from_millis(amount)),
        "us" => Some(Duration::from_micros(amount)),
        "ns" => Some(Duration::from_nanos(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => seconds(60),
        "h" => seconds(3600),
        "d" => seconds(86_400),
        _ => None,
    };
    duration.ok_or_else(|| "must be a duration".to_string())
}

/// A duration that displays the way [`parse_duration`] reads it, for use as
/// a checked property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DurationValue(pub Duration);

impl DurationValue {
    /// Parses with [`parse_duration`].
    pub fn parse(raw: &str) -> Result<Self, String> {
        parse_duration(raw).map(Self)
    }
}

impl std::fmt::Display for DurationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_duration(&self.0))
    }
}

/// Formats a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 || millis % 1000 != 0 {
        format!("{millis}ms")
    } else if millis % 60_000 != 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}m", millis / 60_000)
    }
}
