use std::{collections::HashMap, ops::DerefMut, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use tidemark_common::ConditionalSync;
use tokio::sync::RwLock;

use crate::TidemarkStorageError;

use super::BlockStore;

/// A trivial implementation of [BlockStore] - backed by a [HashMap] -
/// where all blocks are kept in memory and never persisted.
#[derive(Clone, Default)]
pub struct MemoryBlockStore<Address, Bytes>
where
    Address: Eq + std::hash::Hash,
    Bytes: Clone,
{
    blocks: Arc<RwLock<HashMap<Address, Bytes>>>,
}

impl<Address, Bytes> MemoryBlockStore<Address, Bytes>
where
    Address: Clone + Eq + std::hash::Hash + ConditionalSync,
    Bytes: Clone + ConditionalSync,
{
    /// Returns a stream over all stored blocks, leaving them in place.
    pub fn read_all(
        &self,
    ) -> impl Stream<Item = Result<(Address, Bytes), TidemarkStorageError>> + '_ {
        try_stream! {
            let blocks = self.blocks.read().await;
            for (address, bytes) in blocks.iter() {
                yield (address.clone(), bytes.clone());
            }
        }
    }

    /// Removes and returns all stored blocks as a stream.
    pub fn drain(
        &mut self,
    ) -> impl Stream<Item = Result<(Address, Bytes), TidemarkStorageError>> + '_ {
        try_stream! {
            let blocks = std::mem::take(self.blocks.write().await.deref_mut());

            for (address, bytes) in blocks.into_iter() {
                yield (address, bytes);
            }
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Address, Bytes> BlockStore for MemoryBlockStore<Address, Bytes>
where
    Address: Clone + Eq + std::hash::Hash + ConditionalSync,
    Bytes: Clone + ConditionalSync,
{
    type Address = Address;
    type Bytes = Bytes;
    type Error = TidemarkStorageError;

    async fn put(
        &mut self,
        address: Self::Address,
        bytes: Self::Bytes,
    ) -> Result<(), Self::Error> {
        let mut blocks = self.blocks.write().await;
        blocks.insert(address, bytes);
        Ok(())
    }

    async fn get(&self, address: &Self::Address) -> Result<Option<Self::Bytes>, Self::Error> {
        let blocks = self.blocks.read().await;
        Ok(blocks.get(address).cloned())
    }
}
