use std::{collections::HashMap, hash::Hash, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ConditionalSync, DataManagerError, ReadWriteStorage, Storage};

/// A trivial implementation of [ReadWriteStorage] - backed by a [HashMap] -
/// where all values are kept in memory and never persisted. This is the
/// default fallback of a [DataManager](crate::DataManager), used for every key
/// that no [DedicatedStorage](crate::DedicatedStorage) is able to store.
#[derive(Clone, Debug)]
pub struct MemoryStorage<Key, Value>
where
    Key: Eq + Hash,
{
    entries: Arc<RwLock<HashMap<Key, Value>>>,
}

impl<Key, Value> Default for MemoryStorage<Key, Value>
where
    Key: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<Key, Value> MemoryStorage<Key, Value>
where
    Key: Eq + Hash,
{
    /// The number of entries currently held
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if no entry is currently held
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// True if a value is held for the given key
    pub async fn contains(&self, key: &Key) -> bool {
        self.entries.read().await.contains_key(key)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> Storage for MemoryStorage<Key, Value>
where
    Key: Eq + Hash + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    type Key = Key;
    type Value = Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> ReadWriteStorage for MemoryStorage<Key, Value>
where
    Key: Eq + Hash + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), DataManagerError> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key))
    }
}
