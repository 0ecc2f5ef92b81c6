// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{
    borrow::Borrow,
    collections::HashMap,
    hash::Hash,
    ops::{Deref, DerefMut},
};

/// Value handed back by [`BoundedKeyedCache::get_or_create`]
///
/// Callers treat both variants the same way through `Deref`/`DerefMut`; the
/// distinction only matters to code that wants to know whether its updates
/// will be retained.
#[derive(Debug)]
pub enum Resolved<'a, V> {
    Cached(&'a mut V), // Entry stored in the cache
    Transient(V),      // Fresh value the full cache refused to retain
}

impl<V> Resolved<'_, V> {
    pub fn is_cached(&self) -> bool {
        matches!(self, Resolved::Cached(_))
    }
}

impl<V> Deref for Resolved<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        match self {
            Resolved::Cached(value) => value,
            Resolved::Transient(value) => value,
        }
    }
}

impl<V> DerefMut for Resolved<'_, V> {
    fn deref_mut(&mut self) -> &mut V {
        match self {
            Resolved::Cached(value) => value,
            Resolved::Transient(value) => value,
        }
    }
}

/// Fixed-capacity map whose entries are created lazily and never evicted
///
/// Once `capacity` keys are present, lookups of unknown keys still get a
/// freshly built value, but that value is not stored. Existing entries are
/// never replaced, so long-lived accumulators stay put instead of churning.
/// Not synchronized; the owner provides mutual exclusion.
#[derive(Debug, Clone)]
pub struct BoundedKeyedCache<K, V>
where
    K: Eq + Hash,
{
    entries: HashMap<K, V>,
    capacity: usize,
}

impl<K, V> BoundedKeyedCache<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty cache retaining at most `capacity` keys
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns the value for `key`, building it with `factory` when absent
    ///
    /// # Arguments
    /// * `key` - The key to look up; an owned copy is made only on insertion
    /// * `factory` - Called only when `key` is absent
    ///
    /// # Returns
    /// * `Resolved::Cached` for stored entries (existing or newly inserted)
    /// * `Resolved::Transient` when the key is absent and the cache is full
    pub fn get_or_create<Q, F>(&mut self, key: &Q, factory: F) -> Resolved<'_, V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> V,
    {
        if !self.entries.contains_key(key) {
            if self.is_full() {
                return Resolved::Transient(factory());
            }
            return Resolved::Cached(self.entries.entry(key.to_owned()).or_insert_with(factory));
        }
        match self.entries.get_mut(key) {
            Some(value) => Resolved::Cached(value),
            None => Resolved::Transient(factory()),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    /// Point-in-time copies of all stored values, in no particular order
    pub fn snapshot_values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.entries.values().cloned().collect()
    }

    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        for (key, value) in &self.entries {
            visitor(key, value);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
