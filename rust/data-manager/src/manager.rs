use std::{
    fmt::Debug,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    ConditionalSend, ConditionalSync, DataManagerConfig, DataManagerError, MemoryStorage,
    ReadWriteStorage, Responsible, ResponsibilityTable, SharedStorage, Storage,
};

/// The registered dedicated storages (in registration order) together with
/// the memoized responsibilities they have been assigned. Both live behind
/// one lock so that resolving and memoizing an owner cannot interleave with a
/// registration.
struct Registry<Key, Value>
where
    Key: Eq + Hash,
{
    storages: Vec<SharedStorage<Key, Value>>,
    responsibilities: ResponsibilityTable<Key, Value>,
}

impl<Key, Value> Default for Registry<Key, Value>
where
    Key: Eq + Hash,
{
    fn default() -> Self {
        Self {
            storages: Vec::new(),
            responsibilities: ResponsibilityTable::default(),
        }
    }
}

impl<Key, Value> Registry<Key, Value>
where
    Key: Eq + Hash + ConditionalSync,
    Value: ConditionalSend,
{
    fn position(&self, storage: &SharedStorage<Key, Value>) -> Option<usize> {
        self.storages
            .iter()
            .position(|registered| Arc::ptr_eq(registered, storage))
    }

    fn contains(&self, storage: &SharedStorage<Key, Value>) -> bool {
        self.position(storage).is_some()
    }
}

/// Keeps the first error of a fan-out that has to reach every storage even
/// when one of them fails
struct FirstError(Option<DataManagerError>);

impl FirstError {
    fn new() -> Self {
        Self(None)
    }

    fn record<T>(&mut self, result: Result<T, DataManagerError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                if self.0.is_none() {
                    self.0 = Some(error);
                }
                None
            }
        }
    }

    fn into_result(self) -> Result<(), DataManagerError> {
        match self.0 {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// What a removal fan-out yielded: the value the owner gave back (even if
/// another storage failed) and the first failure, if any
struct Removal<Value> {
    value: Option<Value>,
    errors: FirstError,
}

/// A [DataManager] maps keys to values, like any other [ReadWriteStorage].
/// Behind that interface, it routes each key to one of several storage
/// strategies.
///
/// As long as no [DedicatedStorage](crate::DedicatedStorage) is registered,
/// everything goes to the fallback storage (a [MemoryStorage] by default).
/// Once a dedicated storage is registered, it takes priority for every key it
/// is able to store. If several registered storages are able to store the same
/// key, one of them is picked according to the configured
/// [TieBreak](crate::TieBreak), a warning is logged, and the choice is kept
/// until a registration or deregistration reprocesses the key.
///
/// Every write and removal is also forwarded to the dedicated storages that
/// depend on the key without owning it, so that they can keep derived data up
/// to date.
///
/// All operations hold an internal lock from ownership resolution to the end
/// of the fan-out, so a [DataManager] may be shared between tasks.
pub struct DataManager<Key, Value, Fallback = MemoryStorage<Key, Value>>
where
    Key: Eq + Hash,
    Fallback: ReadWriteStorage<Key = Key, Value = Value>,
{
    config: DataManagerConfig,
    fallback: Fallback,
    registry: Mutex<Registry<Key, Value>>,
    ambiguities: AtomicUsize,
}

impl<Key, Value> DataManager<Key, Value>
where
    Key: Eq + Hash + Clone + Debug + ConditionalSync + 'static,
    Value: Clone + ConditionalSync + 'static,
{
    /// A [DataManager] with the default configuration and an in-memory
    /// fallback
    pub fn new() -> Self {
        Self::with_config(DataManagerConfig::default())
    }

    /// A [DataManager] with the given configuration and an in-memory fallback
    pub fn with_config(config: DataManagerConfig) -> Self {
        Self::with_fallback(MemoryStorage::default(), config)
    }
}

impl<Key, Value> Default for DataManager<Key, Value>
where
    Key: Eq + Hash + Clone + Debug + ConditionalSync + 'static,
    Value: Clone + ConditionalSync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Key, Value, Fallback> DataManager<Key, Value, Fallback>
where
    Key: Eq + Hash + Clone + Debug + ConditionalSync + 'static,
    Value: Clone + ConditionalSync + 'static,
    Fallback: ReadWriteStorage<Key = Key, Value = Value>,
{
    /// A [DataManager] that stores unclaimed keys in `fallback`
    pub fn with_fallback(fallback: Fallback, config: DataManagerConfig) -> Self {
        Self {
            config,
            fallback,
            registry: Mutex::new(Registry::default()),
            ambiguities: AtomicUsize::default(),
        }
    }

    /// The configuration this [DataManager] was created with
    pub fn config(&self) -> &DataManagerConfig {
        &self.config
    }

    /// The storage used for keys that no dedicated storage is able to store
    pub fn fallback(&self) -> &Fallback {
        &self.fallback
    }

    /// Retrieve the value stored against `key` by its responsible storage.
    /// Missing data is not an error: it yields `None`.
    pub async fn get(&self, key: &Key) -> Result<Option<Value>, DataManagerError> {
        let mut registry = self.registry.lock().await;
        match self.resolve(&mut registry, key) {
            Responsible::Fallback => self.fallback.get(key).await,
            Responsible::Dedicated(storage) => storage.get(key).await,
        }
    }

    /// Store `value` against `key`. The responsible storage keeps it, and every
    /// dependee is notified.
    ///
    /// A failing storage does not stop the others from being called; the
    /// first error is returned once all of them were.
    pub async fn set(&self, key: Key, value: Value) -> Result<(), DataManagerError> {
        let mut registry = self.registry.lock().await;
        self.set_in(&mut registry, key, value).await
    }

    /// Remove the value stored against `key`, returning the one held by the
    /// responsible storage (if any). Every dependee is notified.
    ///
    /// A failing storage does not stop the others from being called; the
    /// first error is returned once all of them were.
    pub async fn remove(&self, key: &Key) -> Result<Option<Value>, DataManagerError> {
        let mut registry = self.registry.lock().await;
        let removal = self.remove_in(&mut registry, key).await;
        removal.errors.into_result()?;
        Ok(removal.value)
    }

    /// Register a dedicated storage.
    ///
    /// With `reprocess`, the data already known to the manager is moved around
    /// so that the new storage takes part in it: every key it depends on or is
    /// able to store is removed and set again, and the new storage becomes the
    /// owner of every such key it is able to store, whoever owned it before.
    /// Without `reprocess`, only future resolutions are affected.
    ///
    /// If a storage fails while data is being moved, the registration is
    /// undone, the data taken out so far is put back and the error is
    /// returned.
    ///
    /// Registering a storage that is already registered does nothing. Returns
    /// true if the storage was not registered yet.
    pub async fn add_storage(
        &self,
        storage: SharedStorage<Key, Value>,
        reprocess: bool,
    ) -> Result<bool, DataManagerError> {
        let mut registry = self.registry.lock().await;

        if registry.contains(&storage) {
            tracing::debug!(storage = storage.name(), "Storage already registered");
            return Ok(false);
        }

        registry.storages.push(storage.clone());
        tracing::debug!(storage = storage.name(), reprocess, "Registered storage");

        if !reprocess {
            return Ok(true);
        }

        let keys = registry.responsibilities.keys();
        let mut staged = Vec::new();
        let mut failure = None;

        for key in keys {
            let storable = storage.is_storable(&key);
            if !storable && !storage.is_dependee(&key) {
                continue;
            }

            let removal = self.remove_in(&mut registry, &key).await;
            if let Some(value) = removal.value {
                staged.push((key.clone(), value));
            }
            if let Err(error) = removal.errors.into_result() {
                failure = Some(error);
                break;
            }

            // Known data moves to the newcomer regardless of the tie-break
            if storable {
                registry
                    .responsibilities
                    .insert(key, Responsible::Dedicated(storage.clone()));
            }
        }

        if let Some(error) = failure {
            tracing::warn!(
                storage = storage.name(),
                %error,
                "Registration failed, restoring previous owners"
            );

            if let Some(position) = registry.position(&storage) {
                registry.storages.remove(position);
            }
            for key in registry.responsibilities.keys_owned_by(&storage) {
                registry.responsibilities.invalidate(&key);
            }
            if let Err(restore) = self.reinsert(&mut registry, staged).await {
                tracing::error!(
                    error = %restore,
                    "Failed to restore data after a failed registration"
                );
            }

            return Err(error);
        }

        self.reinsert(&mut registry, staged).await?;

        Ok(true)
    }

    /// Deregister a dedicated storage.
    ///
    /// With `reprocess`, every key the storage was responsible for is taken
    /// out of it and set again, so that it finds a new responsible (another
    /// dedicated storage, or the fallback). Without `reprocess`, the memoized
    /// responsibilities are left untouched, and the storage keeps serving (and
    /// receiving) the keys it was responsible for.
    ///
    /// If a storage fails while data is being moved, the storage is registered
    /// again, the data taken out of it so far is given back and the error is
    /// returned.
    ///
    /// Deregistering a storage that is not registered does nothing. Returns
    /// true if the storage was registered.
    pub async fn remove_storage(
        &self,
        storage: &SharedStorage<Key, Value>,
        reprocess: bool,
    ) -> Result<bool, DataManagerError> {
        let mut registry = self.registry.lock().await;

        let Some(position) = registry.position(storage) else {
            tracing::debug!(storage = storage.name(), "Storage not registered");
            return Ok(false);
        };

        registry.storages.remove(position);
        tracing::debug!(storage = storage.name(), reprocess, "Deregistered storage");

        if !reprocess {
            return Ok(true);
        }

        let keys = registry.responsibilities.keys_owned_by(storage);
        let mut staged = Vec::new();
        let mut failure = None;

        for key in keys {
            // The departing storage is not registered anymore, so it has to be
            // asked for its data directly
            let value = match storage.remove(&key, true).await {
                Ok(value) => value,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            };

            registry.responsibilities.invalidate(&key);
            if let Some(value) = value {
                staged.push((key.clone(), value));
            }

            let mut errors = FirstError::new();
            for remaining in registry.storages.iter() {
                if remaining.is_dependee(&key) {
                    errors.record(remaining.remove(&key, false).await);
                }
            }
            if let Err(error) = errors.into_result() {
                failure = Some(error);
                break;
            }
        }

        if let Some(error) = failure {
            tracing::warn!(
                storage = storage.name(),
                %error,
                "Deregistration failed, restoring storage"
            );

            registry.storages.insert(position, storage.clone());
            for (key, _) in staged.iter() {
                registry
                    .responsibilities
                    .insert(key.clone(), Responsible::Dedicated(storage.clone()));
            }
            if let Err(restore) = self.reinsert(&mut registry, staged).await {
                tracing::error!(
                    error = %restore,
                    "Failed to restore data after a failed deregistration"
                );
            }

            return Err(error);
        }

        self.reinsert(&mut registry, staged).await?;

        Ok(true)
    }

    /// [DataManager::add_storage], reprocessing according to
    /// [DataManagerConfig::reprocess_by_default]
    pub async fn register(
        &self,
        storage: SharedStorage<Key, Value>,
    ) -> Result<bool, DataManagerError> {
        self.add_storage(storage, self.config.reprocess_by_default)
            .await
    }

    /// [DataManager::remove_storage], reprocessing according to
    /// [DataManagerConfig::reprocess_by_default]
    pub async fn deregister(
        &self,
        storage: &SharedStorage<Key, Value>,
    ) -> Result<bool, DataManagerError> {
        self.remove_storage(storage, self.config.reprocess_by_default)
            .await
    }

    /// The memoized responsible for `key`, without resolving it if it is
    /// not known yet
    pub async fn responsible_for(&self, key: &Key) -> Option<Responsible<Key, Value>> {
        let registry = self.registry.lock().await;
        registry.responsibilities.get(key).cloned()
    }

    /// The responsible for `key`, resolving (and memoizing) it if needed
    pub async fn resolve_responsible(&self, key: &Key) -> Responsible<Key, Value> {
        let mut registry = self.registry.lock().await;
        self.resolve(&mut registry, key)
    }

    /// True if `storage` is currently registered
    pub async fn is_registered(&self, storage: &SharedStorage<Key, Value>) -> bool {
        self.registry.lock().await.contains(storage)
    }

    /// The number of registered dedicated storages
    pub async fn storage_count(&self) -> usize {
        self.registry.lock().await.storages.len()
    }

    /// Every key with a memoized responsible, in resolution order
    pub async fn known_keys(&self) -> Vec<Key> {
        self.registry.lock().await.responsibilities.keys()
    }

    /// The number of times a key had several eligible owners when it was
    /// resolved
    pub fn ambiguities(&self) -> usize {
        self.ambiguities.load(Ordering::Relaxed)
    }

    fn resolve(&self, registry: &mut Registry<Key, Value>, key: &Key) -> Responsible<Key, Value> {
        if let Some(responsible) = registry.responsibilities.get(key) {
            return responsible.clone();
        }

        let candidates = registry
            .storages
            .iter()
            .filter(|storage| storage.is_storable(key))
            .collect::<Vec<_>>();

        let responsible = match self.config.tie_break.select(&candidates) {
            None => Responsible::Fallback,
            Some(chosen) => {
                if candidates.len() > 1 {
                    let names = candidates
                        .iter()
                        .map(|storage| storage.name())
                        .collect::<Vec<_>>();
                    self.ambiguities.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        ?key,
                        candidates = ?names,
                        chosen = chosen.name(),
                        tie_break = %self.config.tie_break,
                        "Several storages are able to store the same key"
                    );
                }
                Responsible::Dedicated(Arc::clone(*chosen))
            }
        };

        registry
            .responsibilities
            .insert(key.clone(), responsible.clone());

        responsible
    }

    /// The responsible for a key when it is a dedicated storage that was
    /// deregistered without reprocessing
    fn detached(
        registry: &Registry<Key, Value>,
        responsible: &Responsible<Key, Value>,
    ) -> Option<SharedStorage<Key, Value>> {
        responsible
            .storage()
            .filter(|storage| !registry.contains(storage))
            .cloned()
    }

    async fn set_in(
        &self,
        registry: &mut Registry<Key, Value>,
        key: Key,
        value: Value,
    ) -> Result<(), DataManagerError> {
        let responsible = self.resolve(registry, &key);
        let mut errors = FirstError::new();

        for storage in registry.storages.iter() {
            let is_owner = responsible.is(storage);
            if is_owner || storage.is_dependee(&key) {
                errors.record(storage.set(key.clone(), value.clone(), is_owner).await);
            }
        }

        if responsible.is_fallback() {
            errors.record(self.fallback.set(key, value).await);
        } else if let Some(owner) = Self::detached(registry, &responsible) {
            errors.record(owner.set(key, value, true).await);
        }

        errors.into_result()
    }

    async fn remove_in(&self, registry: &mut Registry<Key, Value>, key: &Key) -> Removal<Value> {
        let responsible = self.resolve(registry, key);
        let mut removal = Removal {
            value: None,
            errors: FirstError::new(),
        };
        let mut retained = false;

        for storage in registry.storages.iter() {
            let is_owner = responsible.is(storage);
            if !is_owner && !storage.is_dependee(key) {
                continue;
            }
            match removal.errors.record(storage.remove(key, is_owner).await) {
                Some(value) if is_owner => removal.value = value,
                Some(_) => {}
                None => retained |= is_owner,
            }
        }

        let owned = if responsible.is_fallback() {
            Some(self.fallback.remove(key).await)
        } else {
            match Self::detached(registry, &responsible) {
                Some(owner) => Some(owner.remove(key, true).await),
                None => None,
            }
        };
        if let Some(result) = owned {
            match removal.errors.record(result) {
                Some(value) => removal.value = value,
                None => retained = true,
            }
        }

        // An owner that failed to give its value back keeps the key
        if !retained {
            registry.responsibilities.invalidate(key);
        }

        removal
    }

    /// Set every staged value again, going on past failures so that as much
    /// data as possible finds a home. Returns the first error.
    async fn reinsert(
        &self,
        registry: &mut Registry<Key, Value>,
        staged: Vec<(Key, Value)>,
    ) -> Result<(), DataManagerError> {
        if !staged.is_empty() {
            tracing::debug!(count = staged.len(), "Reprocessing migrated data");
        }

        let mut errors = FirstError::new();
        for (key, value) in staged {
            errors.record(self.set_in(registry, key, value).await);
        }

        errors.into_result()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value, Fallback> Storage for DataManager<Key, Value, Fallback>
where
    Key: Eq + Hash + Clone + Debug + ConditionalSync + 'static,
    Value: Clone + ConditionalSync + 'static,
    Fallback: ReadWriteStorage<Key = Key, Value = Value>,
{
    type Key = Key;
    type Value = Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        DataManager::get(self, key).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value, Fallback> ReadWriteStorage for DataManager<Key, Value, Fallback>
where
    Key: Eq + Hash + Clone + Debug + ConditionalSync + 'static,
    Value: Clone + ConditionalSync + 'static,
    Fallback: ReadWriteStorage<Key = Key, Value = Value>,
{
    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), DataManagerError> {
        DataManager::set(self, key, value).await
    }

    async fn remove(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        DataManager::remove(self, key).await
    }
}
