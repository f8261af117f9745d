use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{DataManagerError, ReadWriteStorage, Storage};

/// A [MeasuredStorage] acts as a proxy over a [ReadWriteStorage]
/// implementation that measures reads, writes and removals. Wrapping the
/// fallback of a [DataManager](crate::DataManager) in it shows how often keys
/// end up in the fallback rather than in a dedicated storage.
#[derive(Clone, Debug)]
pub struct MeasuredStorage<Inner>
where
    Inner: ReadWriteStorage,
{
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    removals: Arc<AtomicUsize>,
    inner: Inner,
}

impl<Inner> MeasuredStorage<Inner>
where
    Inner: ReadWriteStorage,
{
    /// Wrap the provided [ReadWriteStorage] so that access to it may be
    /// measured.
    pub fn new(inner: Inner) -> Self {
        Self {
            reads: Arc::new(AtomicUsize::default()),
            writes: Arc::new(AtomicUsize::default()),
            removals: Arc::new(AtomicUsize::default()),
            inner,
        }
    }

    /// The aggregate number of reads from the wrapped [ReadWriteStorage]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The aggregate number of writes to the wrapped [ReadWriteStorage]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// The aggregate number of removals from the wrapped [ReadWriteStorage]
    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::Relaxed)
    }

    /// The wrapped [ReadWriteStorage]
    pub fn inner(&self) -> &Inner {
        &self.inner
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Inner> Storage for MeasuredStorage<Inner>
where
    Inner: ReadWriteStorage,
{
    type Key = Inner::Key;
    type Value = Inner::Value;

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.get(key).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Inner> ReadWriteStorage for MeasuredStorage<Inner>
where
    Inner: ReadWriteStorage,
{
    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), DataManagerError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &Self::Key) -> Result<Option<Self::Value>, DataManagerError> {
        self.removals.fetch_add(1, Ordering::Relaxed);
        self.inner.remove(key).await
    }
}
