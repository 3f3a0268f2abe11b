use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tidemark_common::ConditionalSync;

use super::BlockStore;

/// A [MeasuredBlockStore] acts as a proxy over a [BlockStore]
/// implementation that measures reads and writes.
///
/// Useful in tests that assert on fetch behavior, e.g. that diffing two
/// trees never loads blocks from shared subtrees.
#[derive(Clone)]
pub struct MeasuredBlockStore<Backend>
where
    Backend: BlockStore,
{
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    backend: Backend,
}

impl<Backend> MeasuredBlockStore<Backend>
where
    Backend: BlockStore,
{
    /// Wrap the provided [BlockStore] so that reads and writes to it may
    /// be measured.
    pub fn new(backend: Backend) -> Self {
        Self {
            reads: Arc::new(AtomicUsize::default()),
            writes: Arc::new(AtomicUsize::default()),
            backend,
        }
    }

    /// The aggregate number of reads from the wrapped [BlockStore]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The aggregate number of writes to the wrapped [BlockStore]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Backend> BlockStore for MeasuredBlockStore<Backend>
where
    Backend: BlockStore + ConditionalSync,
{
    type Address = Backend::Address;
    type Bytes = Backend::Bytes;
    type Error = Backend::Error;

    async fn put(
        &mut self,
        address: Self::Address,
        bytes: Self::Bytes,
    ) -> Result<(), Self::Error> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.backend.put(address, bytes).await
    }

    async fn get(&self, address: &Self::Address) -> Result<Option<Self::Bytes>, Self::Error> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.backend.get(address).await
    }
}
