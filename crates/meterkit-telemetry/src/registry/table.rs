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

//! Per-type meter storage shared by the registries.

use meterkit_core::{MeterId, MeterMetadata};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::instruments::{read, write};

/// A registered meter with the metadata it was created with.
pub(crate) struct Registered<M: ?Sized> {
    pub(crate) meter: Arc<M>,
    pub(crate) metadata: MeterMetadata,
}

impl<M: ?Sized> Clone for Registered<M> {
    fn clone(&self) -> Self {
        Self {
            meter: self.meter.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Meters of one kind keyed by identity.
///
/// Lookups take the read lock; only the first registration of an id takes
/// the write lock, and re-checks the map under it so racing creators all
/// receive the same instance.
pub(crate) struct MeterTable<M: ?Sized> {
    entries: RwLock<HashMap<MeterId, Registered<M>>>,
}

impl<M: ?Sized> MeterTable<M> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the meter registered under `id`, creating it with `create`
    /// if there is none. `create` runs at most once per id.
    pub(crate) fn find_or_create(
        &self,
        id: MeterId,
        metadata: MeterMetadata,
        create: impl FnOnce(&MeterId) -> Arc<M>,
    ) -> Arc<M> {
        if let Some(existing) = read(&self.entries).get(&id) {
            return existing.meter.clone();
        }

        let mut entries = write(&self.entries);
        match entries.entry(id) {
            Entry::Occupied(entry) => entry.get().meter.clone(),
            Entry::Vacant(entry) => {
                let meter = create(entry.key());
                log::debug!(
                    "Registered {:?} meter: {}",
                    entry.key().meter_type,
                    entry.key()
                );
                entry.insert(Registered {
                    meter: meter.clone(),
                    metadata,
                });
                meter
            }
        }
    }

    pub(crate) fn get(&self, id: &MeterId) -> Option<Arc<M>> {
        read(&self.entries).get(id).map(|r| r.meter.clone())
    }

    pub(crate) fn contains(&self, id: &MeterId) -> bool {
        read(&self.entries).contains_key(id)
    }

    pub(crate) fn remove(&self, id: &MeterId) -> Option<Arc<M>> {
        write(&self.entries).remove(id).map(|r| r.meter)
    }

    /// Drops every entry for which `keep` returns `false`, returning how many
    /// were dropped.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&Registered<M>) -> bool) -> usize {
        let mut entries = write(&self.entries);
        let before = entries.len();
        entries.retain(|_, registered| keep(registered));
        before - entries.len()
    }

    /// A copy of every entry, so callers can sample meters without holding
    /// the table lock.
    pub(crate) fn entries(&self) -> Vec<(MeterId, Registered<M>)> {
        read(&self.entries)
            .iter()
            .map(|(id, registered)| (id.clone(), registered.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        read(&self.entries).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterkit_core::MeterType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_racing_creators_share_one_instance() {
        let table: MeterTable<String> = MeterTable::new();
        let created = AtomicUsize::new(0);
        let barrier = Barrier::new(8);
        let id = MeterId::new("shared", MeterType::Counter);

        let results: Vec<Arc<String>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        table.find_or_create(id.clone(), MeterMetadata::default(), |_| {
                            created.fetch_add(1, Ordering::SeqCst);
                            Arc::new("meter".to_string())
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_retain_and_remove() {
        let table: MeterTable<u32> = MeterTable::new();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            table.find_or_create(
                MeterId::new(*name, MeterType::Gauge),
                MeterMetadata::default(),
                |_| Arc::new(i as u32),
            );
        }

        assert_eq!(table.retain(|r| *r.meter != 1), 1);
        assert!(!table.contains(&MeterId::new("b", MeterType::Gauge)));
        assert_eq!(
            table.remove(&MeterId::new("a", MeterType::Gauge)).as_deref(),
            Some(&0)
        );
        assert_eq!(table.len(), 1);
        assert!(table.get(&MeterId::new("c", MeterType::Gauge)).is_some());
    }
}
