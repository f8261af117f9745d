use std::sync::Arc;

use async_trait::async_trait;

use crate::{ConditionalSend, ConditionalSync, DataManagerError};

mod memory;
pub use memory::*;

mod measure;
pub use measure::*;

/// A [Storage] is anything that data can be read back from by key. It makes no
/// assumption about how (or by whom) the data got there; write access is
/// described separately by [ReadWriteStorage] and [DedicatedStorage].
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Storage: ConditionalSync {
    /// The key type used by this [Storage]
    type Key: ConditionalSync;
    /// The value type able to be retrieved from this [Storage]
    type Value: ConditionalSend;

    /// Retrieve a value (if any) stored against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError>;
}

/// A [Storage] that can be written to unconditionally. This is the shape of
/// the fallback storage used by a [DataManager](crate::DataManager), and of
/// the [DataManager](crate::DataManager) itself.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ReadWriteStorage: Storage {
    /// Store the given value against the given key
    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), DataManagerError>;
    /// Remove the value stored against the given key, returning it (if any)
    async fn remove(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError>;
}

/// A [DedicatedStorage] is a storage strategy that only cares about some keys.
///
/// It answers two different questions about a key:
///
/// - [is_storable](DedicatedStorage::is_storable): could it be the owner of
///   the key, i.e. keep the authoritative copy of its value?
/// - [is_dependee](DedicatedStorage::is_dependee): does it need to hear about
///   every change to the key, for instance because it maintains an index or
///   some other derived data?
///
/// Several dedicated storages may depend on the same key, but only one of
/// them owns it. A dedicated storage never decides that by itself: the
/// [DataManager](crate::DataManager) arbitrates and passes the outcome as the
/// `is_owner` flag of [set](DedicatedStorage::set) and
/// [remove](DedicatedStorage::remove). When the flag is false, the storage
/// should only update its own derived state.
///
/// Implementations must not call back into the [DataManager](crate::DataManager)
/// they are registered with from within these methods: the manager holds its
/// lock for the whole duration of an operation.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait DedicatedStorage: Storage {
    /// True if this storage is able to own the given key. Must only depend on
    /// the key and on the storage's own state.
    fn is_storable(&self, key: &Self::Key) -> bool;

    /// True if this storage must be notified when the given key is set or
    /// removed, whether or not it owns it
    fn is_dependee(&self, key: &Self::Key) -> bool;

    /// Store `value` against `key` if `is_owner` is true; in any case update
    /// whatever derived state depends on `key`
    async fn set(
        &self,
        key: Self::Key,
        value: Self::Value,
        is_owner: bool,
    ) -> Result<(), DataManagerError>;

    /// Remove and return the value stored against `key` if `is_owner` is true;
    /// otherwise only update derived state and return `None`
    async fn remove(
        &self,
        key: &Self::Key,
        is_owner: bool,
    ) -> Result<Option<Self::Value>, DataManagerError>;

    /// A human readable name, used in diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A shared handle to a [DedicatedStorage], as registered with a
/// [DataManager](crate::DataManager). Two handles designate the same storage
/// when they point to the same allocation.
pub type SharedStorage<Key, Value> = Arc<dyn DedicatedStorage<Key = Key, Value = Value>>;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<T> Storage for Arc<T>
where
    T: Storage + ?Sized,
{
    type Key = T::Key;
    type Value = T::Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        (**self).get(key).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<T> ReadWriteStorage for Arc<T>
where
    T: ReadWriteStorage + ?Sized,
{
    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), DataManagerError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        (**self).remove(key).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<T> DedicatedStorage for Arc<T>
where
    T: DedicatedStorage + ?Sized,
{
    fn is_storable(&self, key: &Self::Key) -> bool {
        (**self).is_storable(key)
    }

    fn is_dependee(&self, key: &Self::Key) -> bool {
        (**self).is_dependee(key)
    }

    async fn set(
        &self,
        key: Self::Key,
        value: Self::Value,
        is_owner: bool,
    ) -> Result<(), DataManagerError> {
        (**self).set(key, value, is_owner).await
    }

    async fn remove(
        &self,
        key: &Self::Key,
        is_owner: bool,
    ) -> Result<Option<Self::Value>, DataManagerError> {
        (**self).remove(key, is_owner).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
