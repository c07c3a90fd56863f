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

//! Declarative validation of configuration properties.
//!
//! A [`PropertyCheck`] describes one property: where its value comes from,
//! whether it is required, and which rules it must satisfy. Checks are
//! evaluated with [`check_all`], which always returns a [`ValidationResult`]
//! instead of failing, so callers decide whether an invalid configuration is
//! fatal or merely worth a warning.

use std::fmt::Display;

use super::ConfigSource;
use crate::error::{MetricsError, MetricsResult};

/// The outcome of checking a single property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    /// The property resolved to an acceptable value.
    Valid {
        /// The property name.
        property: String,
        /// The effective value, formatted for display.
        value: String,
    },
    /// The property is missing, malformed or out of range.
    Invalid {
        /// The property name.
        property: String,
        /// The offending value, if one was resolved.
        value: Option<String>,
        /// Why the value was rejected.
        message: String,
    },
}

impl Validated {
    /// Creates a `Valid` entry.
    pub fn valid(property: impl Into<String>, value: impl Into<String>) -> Self {
        Validated::Valid {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Creates an `Invalid` entry.
    pub fn invalid(
        property: impl Into<String>,
        value: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Validated::Invalid {
            property: property.into(),
            value,
            message: message.into(),
        }
    }

    /// Returns `true` for `Valid` entries.
    pub fn is_valid(&self) -> bool {
        matches!(self, Validated::Valid { .. })
    }

    /// The property this entry refers to.
    pub fn property(&self) -> &str {
        match self {
            Validated::Valid { property, .. } | Validated::Invalid { property, .. } => property,
        }
    }

    /// The failure message of an `Invalid` entry.
    pub fn message(&self) -> Option<&str> {
        match self {
            Validated::Valid { .. } => None,
            Validated::Invalid { message, .. } => Some(message),
        }
    }
}

impl Display for Validated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validated::Valid { property, value } => write!(f, "{property}={value}"),
            Validated::Invalid {
                property,
                value: Some(value),
                message,
            } => write!(f, "{property} ({value}) {message}"),
            Validated::Invalid {
                property,
                value: None,
                message,
            } => write!(f, "{property} {message}"),
        }
    }
}

/// The ordered outcome of validating a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    entries: Vec<Validated>,
}

impl ValidationResult {
    /// An empty (and therefore valid) result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends entries.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = Validated>) {
        self.entries.extend(entries);
    }

    /// Concatenates two results.
    pub fn and(mut self, other: ValidationResult) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Every entry, valid or not, in evaluation order.
    pub fn entries(&self) -> &[Validated] {
        &self.entries
    }

    /// The `Invalid` entries.
    pub fn failures(&self) -> impl Iterator<Item = &Validated> {
        self.entries.iter().filter(|v| !v.is_valid())
    }

    /// The messages of the `Invalid` entries, in order.
    pub fn failure_messages(&self) -> Vec<&str> {
        self.failures().filter_map(Validated::message).collect()
    }

    /// Returns `true` when no entry is `Invalid`.
    pub fn is_valid(&self) -> bool {
        self.entries.iter().all(Validated::is_valid)
    }

    /// Converts the result into an error for callers that want to fail fast.
    pub fn or_fail(self) -> MetricsResult<ValidationResult> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(MetricsError::InvalidConfiguration(
                self.entries.into_iter().filter(|v| !v.is_valid()).collect(),
            ))
        }
    }
}

/// Anything that can validate part of a configuration `C`.
pub trait Check<C: ?Sized> {
    /// Evaluates this check against `config`.
    fn check(&self, config: &C) -> Vec<Validated>;
}

/// Whole sub-validations (e.g. a parent config's `validate`) compose as checks.
impl<C: ?Sized, F> Check<C> for F
where
    F: Fn(&C) -> ValidationResult,
{
    fn check(&self, config: &C) -> Vec<Validated> {
        self(config).entries
    }
}

/// Raw text that failed to parse, with the parser's message.
struct Unparsed {
    raw: String,
    message: String,
}

type Accessor<'a, C, T> = Box<dyn Fn(&C) -> Option<Result<T, Unparsed>> + 'a>;

struct Rule<'a, T> {
    violated: Box<dyn Fn(&T) -> bool + 'a>,
    message: String,
}

/// A declarative check of a single property.
pub struct PropertyCheck<'a, C: ?Sized, T> {
    property: String,
    required: bool,
    accessor: Accessor<'a, C, T>,
    rules: Vec<Rule<'a, T>>,
}

impl<'a, C: ?Sized + 'a, T: Display + 'a> PropertyCheck<'a, C, T> {
    /// Checks the value returned by a typed accessor on the config object.
    pub fn new(property: impl Into<String>, accessor: impl Fn(&C) -> Option<T> + 'a) -> Self {
        Self {
            property: property.into(),
            required: false,
            accessor: Box::new(move |c: &C| accessor(c).map(Ok)),
            rules: Vec::new(),
        }
    }

    /// Marks the property as required: an absent value is reported as
    /// "is required".
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Supplies a value when the accessor resolves nothing.
    pub fn with_default(mut self, default: impl Fn() -> T + 'a) -> Self {
        let accessor = self.accessor;
        self.accessor = Box::new(move |c: &C| accessor(c).or_else(|| Some(Ok(default()))));
        self
    }

    /// Rejects values for which `predicate` holds.
    pub fn invalidate_when(
        mut self,
        predicate: impl Fn(&T) -> bool + 'a,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            violated: Box::new(predicate),
            message: message.into(),
        });
        self
    }

    /// Rejects values below `bound`.
    pub fn min(self, bound: T) -> Self
    where
        T: PartialOrd,
    {
        let message = format!("must be at least {bound}");
        self.invalidate_when(move |v| *v < bound, message)
    }

    /// Rejects values above `bound`.
    pub fn max(self, bound: T) -> Self
    where
        T: PartialOrd,
    {
        let message = format!("cannot be greater than {bound}");
        self.invalidate_when(move |v| *v > bound, message)
    }
}

impl<'a, C: ConfigSource + ?Sized + 'a, T: Display + 'a> PropertyCheck<'a, C, T> {
    /// Checks a raw property looked up from the source and parsed with `parse`.
    /// Parse failures are reported with the raw text and the parser's message.
    pub fn lookup(key: impl Into<String>, parse: fn(&str) -> Result<T, String>) -> Self {
        let key = key.into();
        let lookup_key = key.clone();
        Self {
            property: key,
            required: false,
            accessor: Box::new(move |c: &C| {
                c.get(&lookup_key).map(|raw| match parse(&raw) {
                    Ok(value) => Ok(value),
                    Err(message) => Err(Unparsed { raw, message }),
                })
            }),
            rules: Vec::new(),
        }
    }
}

impl<'a, C: ?Sized, T: Display> Check<C> for PropertyCheck<'a, C, T> {
    fn check(&self, config: &C) -> Vec<Validated> {
        match (self.accessor)(config) {
            None if self.required => {
                vec![Validated::invalid(&self.property, None, "is required")]
            }
            None => Vec::new(),
            Some(Err(Unparsed { raw, message })) => {
                vec![Validated::invalid(&self.property, Some(raw), message)]
            }
            Some(Ok(value)) => {
                let shown = value.to_string();
                let failures: Vec<_> = self
                    .rules
                    .iter()
                    .filter(|rule| (rule.violated)(&value))
                    .map(|rule| {
                        Validated::invalid(&self.property, Some(shown.clone()), &rule.message)
                    })
                    .collect();
                if failures.is_empty() {
                    vec![Validated::valid(&self.property, shown)]
                } else {
                    failures
                }
            }
        }
    }
}

/// Runs every check against `config` and concatenates the outcomes.
pub fn check_all<C: ?Sized>(config: &C, checks: &[&dyn Check<C>]) -> ValidationResult {
    let mut result = ValidationResult::new();
    for check in checks {
        result.extend(check.check(config));
    }
    result
}
