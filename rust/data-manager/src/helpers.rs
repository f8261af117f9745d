use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{ConditionalSync, DataManagerError, DedicatedStorage, Storage};

type Predicate<Key> = Arc<dyn Fn(&Key) -> bool + Send + Sync>;

/// A call received by a [TestStorage] through the [DedicatedStorage] API
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification<Key, Value> {
    /// [DedicatedStorage::set] was called
    Set {
        /// The key being set
        key: Key,
        /// The value being set
        value: Value,
        /// Whether the storage was told it owns the key
        is_owner: bool,
    },
    /// [DedicatedStorage::remove] was called
    Remove {
        /// The key being removed
        key: Key,
        /// Whether the storage was told it owns the key
        is_owner: bool,
    },
}

impl<Key, Value> Notification<Key, Value> {
    /// The ownership flag carried by this notification
    pub fn is_owner(&self) -> bool {
        match self {
            Notification::Set { is_owner, .. } | Notification::Remove { is_owner, .. } => {
                *is_owner
            }
        }
    }
}

/// An in-memory [DedicatedStorage] for tests. What it is able to store and
/// what it depends on are configured with predicates, and every owner-aware
/// call it receives is recorded as a [Notification].
pub struct TestStorage<Key, Value> {
    name: String,
    storable: Predicate<Key>,
    dependee: Predicate<Key>,
    entries: Mutex<HashMap<Key, Value>>,
    notifications: Mutex<Vec<Notification<Key, Value>>>,
    failing: AtomicBool,
}

impl<Key, Value> TestStorage<Key, Value>
where
    Key: Eq + Hash + Clone,
    Value: Clone,
{
    /// A storage that can store nothing and depends on nothing
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            storable: Arc::new(|_| false),
            dependee: Arc::new(|_| false),
            entries: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Be able to store (and depend on) every key matching `predicate`
    pub fn owning<P>(self, predicate: P) -> Self
    where
        P: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate<Key> = Arc::new(predicate);
        Self {
            storable: predicate.clone(),
            dependee: predicate,
            ..self
        }
    }

    /// Be able to store every key matching `predicate`, without depending on it
    pub fn storing<P>(self, predicate: P) -> Self
    where
        P: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        Self {
            storable: Arc::new(predicate),
            ..self
        }
    }

    /// Depend on every key matching `predicate`
    pub fn depending_on<P>(self, predicate: P) -> Self
    where
        P: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        Self {
            dependee: Arc::new(predicate),
            ..self
        }
    }

    /// Make every subsequent owner-aware call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Every notification received so far, in order
    pub fn notifications(&self) -> Vec<Notification<Key, Value>> {
        self.notifications.lock().clone()
    }

    /// Drain the notifications received so far
    pub fn take_notifications(&self) -> Vec<Notification<Key, Value>> {
        std::mem::take(&mut *self.notifications.lock())
    }

    /// True if an authoritative value is held for `key`
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// The number of authoritative values held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no authoritative value is held
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check(&self) -> Result<(), DataManagerError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(DataManagerError::Storage(format!(
                "Storage '{}' is failing",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> Storage for TestStorage<Key, Value>
where
    Key: Eq + Hash + Clone + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    type Key = Key;
    type Value = Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> DedicatedStorage for TestStorage<Key, Value>
where
    Key: Eq + Hash + Clone + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    fn is_storable(&self, key: &Self::Key) -> bool {
        (self.storable)(key)
    }

    fn is_dependee(&self, key: &Self::Key) -> bool {
        (self.dependee)(key)
    }

    async fn set(
        &self,
        key: Self::Key,
        value: Self::Value,
        is_owner: bool,
    ) -> Result<(), DataManagerError> {
        self.check()?;
        self.notifications.lock().push(Notification::Set {
            key: key.clone(),
            value: value.clone(),
            is_owner,
        });
        if is_owner {
            self.entries.lock().insert(key, value);
        }
        Ok(())
    }

    async fn remove(
        &self,
        key: &Self::Key,
        is_owner: bool,
    ) -> Result<Option<Self::Value>, DataManagerError> {
        self.check()?;
        self.notifications.lock().push(Notification::Remove {
            key: key.clone(),
            is_owner,
        });
        if is_owner {
            return Ok(self.entries.lock().remove(key));
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
