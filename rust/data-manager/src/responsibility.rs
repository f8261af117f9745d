use std::{fmt::Debug, hash::Hash, sync::Arc};

use indexmap::IndexMap;

use crate::{ConditionalSend, ConditionalSync, SharedStorage};

/// The storage that is authoritative for the value of a key: either one of the
/// registered [DedicatedStorage](crate::DedicatedStorage)s, or the fallback
/// storage of the [DataManager](crate::DataManager).
pub enum Responsible<Key, Value> {
    /// The fallback storage owns the key
    Fallback,
    /// A registered dedicated storage owns the key
    Dedicated(SharedStorage<Key, Value>),
}

impl<Key, Value> Responsible<Key, Value>
where
    Key: ConditionalSync,
    Value: ConditionalSend,
{
    /// True if this designates the fallback storage
    pub fn is_fallback(&self) -> bool {
        matches!(self, Responsible::Fallback)
    }

    /// True if this designates exactly the given dedicated storage
    pub fn is(&self, storage: &SharedStorage<Key, Value>) -> bool {
        match self {
            Responsible::Dedicated(responsible) => Arc::ptr_eq(responsible, storage),
            Responsible::Fallback => false,
        }
    }

    /// The dedicated storage designated by this, if any
    pub fn storage(&self) -> Option<&SharedStorage<Key, Value>> {
        match self {
            Responsible::Dedicated(storage) => Some(storage),
            Responsible::Fallback => None,
        }
    }

    /// A human readable name, used in diagnostics
    pub fn name(&self) -> &str {
        match self {
            Responsible::Dedicated(storage) => storage.name(),
            Responsible::Fallback => "fallback",
        }
    }
}

impl<Key, Value> Clone for Responsible<Key, Value> {
    fn clone(&self) -> Self {
        match self {
            Responsible::Fallback => Responsible::Fallback,
            Responsible::Dedicated(storage) => Responsible::Dedicated(storage.clone()),
        }
    }
}

impl<Key, Value> PartialEq for Responsible<Key, Value>
where
    Key: ConditionalSync,
    Value: ConditionalSend,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Responsible::Fallback, Responsible::Fallback) => true,
            (Responsible::Dedicated(storage), other) => other.is(storage),
            _ => false,
        }
    }
}

impl<Key, Value> Debug for Responsible<Key, Value>
where
    Key: ConditionalSync,
    Value: ConditionalSend,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Responsible::Fallback => write!(f, "Fallback"),
            Responsible::Dedicated(storage) => {
                f.debug_tuple("Dedicated").field(&storage.name()).finish()
            }
        }
    }
}

/// Memoized mapping from key to its [Responsible] storage.
///
/// Entries are only ever added once a key has been resolved, and are only
/// dropped explicitly; nothing here recomputes ownership. Keys are kept in
/// resolution order so that migrations visit them deterministically.
pub struct ResponsibilityTable<Key, Value>
where
    Key: Eq + Hash,
{
    entries: IndexMap<Key, Responsible<Key, Value>>,
}

impl<Key, Value> Default for ResponsibilityTable<Key, Value>
where
    Key: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<Key, Value> ResponsibilityTable<Key, Value>
where
    Key: Eq + Hash + Clone + ConditionalSync,
    Value: ConditionalSend,
{
    /// The memoized responsible for `key`, if it was resolved already
    pub fn get(&self, key: &Key) -> Option<&Responsible<Key, Value>> {
        self.entries.get(key)
    }

    /// Memoize `responsible` for `key`, returning the entry it replaces
    pub fn insert(
        &mut self,
        key: Key,
        responsible: Responsible<Key, Value>,
    ) -> Option<Responsible<Key, Value>> {
        self.entries.insert(key, responsible)
    }

    /// Drop the memoized responsible for `key`, forcing a later re-resolution
    pub fn invalidate(&mut self, key: &Key) -> Option<Responsible<Key, Value>> {
        self.entries.shift_remove(key)
    }

    /// True if `key` has been resolved and not invalidated since
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// A snapshot of every resolved key
    pub fn keys(&self) -> Vec<Key> {
        self.entries.keys().cloned().collect()
    }

    /// A snapshot of the keys whose responsible is exactly `storage`
    pub fn keys_owned_by(&self, storage: &SharedStorage<Key, Value>) -> Vec<Key> {
        self.entries
            .iter()
            .filter(|(_, responsible)| responsible.is(storage))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The number of resolved keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no key has been resolved
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
