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

//! Meter identity: name, tags and type.

use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use super::MeterType;

/// A single dimension of a meter, such as `method=GET`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Tag {
    /// The dimension name.
    pub key: String,
    /// The dimension value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A set of tags, kept sorted by key with at most one value per key.
///
/// When the same key is supplied twice, the last value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// An empty tag set.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Builds a tag set from key/value pairs.
    pub fn of(pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .fold(Self::empty(), |tags, (k, v)| tags.and(*k, *v))
    }

    /// Returns a copy of this set with one more tag.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(Tag::new(key, value));
        self
    }

    /// Merges another set into this one. Tags from `other` win on key clashes.
    pub fn and_all(mut self, other: &Tags) -> Self {
        for tag in other.iter() {
            self.insert(tag.clone());
        }
        self
    }

    fn insert(&mut self, tag: Tag) {
        match self.0.binary_search_by(|t| t.key.cmp(&tag.key)) {
            Ok(pos) => self.0[pos] = tag,
            Err(pos) => self.0.insert(pos, tag),
        }
    }

    /// Iterates over the tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Looks up the value of a tag by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// The number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[(&str, &str)]> for Tags {
    fn from(pairs: &[(&str, &str)]) -> Self {
        Tags::of(pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Tags {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Tags::of(&pairs)
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(tags: Vec<Tag>) -> Self {
        tags.into_iter().fold(Tags::empty(), |mut acc, tag| {
            acc.insert(tag);
            acc
        })
    }
}

/// The identity of a meter within a registry.
///
/// Two ids are equal when name, tags and type are all equal. Descriptive
/// data such as the description or base unit lives in [`MeterMetadata`] and
/// does not take part in identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MeterId {
    /// The meter name, conventionally dot-separated (e.g. `http.requests`).
    pub name: String,
    /// The dimensions of the meter.
    pub tags: Tags,
    /// What kind of meter this is.
    pub meter_type: MeterType,
}

impl MeterId {
    /// Creates a new id with no tags.
    pub fn new(name: impl Into<String>, meter_type: MeterType) -> Self {
        Self {
            name: name.into(),
            tags: Tags::empty(),
            meter_type,
        }
    }

    /// Replaces the tags of this id.
    pub fn with_tags(mut self, tags: impl Into<Tags>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Adds a single tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags = self.tags.and(key, value);
        self
    }

    /// Returns the same name and tags with a different meter type.
    pub fn retyped(&self, meter_type: MeterType) -> Self {
        Self {
            meter_type,
            ..self.clone()
        }
    }

    /// Returns a formatted representation of the id (e.g. `name[k=v,...]`).
    pub fn to_string_formatted(&self) -> String {
        if self.tags.is_empty() {
            self.name.clone()
        } else {
            let tags_str = self
                .tags
                .iter()
                .map(|t| format!("{}={}", t.key, t.value))
                .collect::<Vec<_>>()
                .join(",");
            format!("{}[{}]", self.name, tags_str)
        }
    }
}

impl Display for MeterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_formatted())
    }
}

/// Descriptive data attached to a meter at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeterMetadata {
    /// A human-readable description of what the meter measures.
    pub description: Option<String>,
    /// The unit of the measured values (e.g. "bytes", "requests").
    pub base_unit: Option<String>,
}

impl MeterMetadata {
    /// Creates metadata from optional description and unit.
    pub fn new(description: Option<String>, base_unit: Option<String>) -> Self {
        Self {
            description,
            base_unit,
        }
    }
}
