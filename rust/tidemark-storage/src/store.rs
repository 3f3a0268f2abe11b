use std::sync::Arc;

use async_trait::async_trait;
use tidemark_common::{ConditionalSend, ConditionalSync};
use tokio::sync::Mutex;

use crate::TidemarkStorageError;

mod content_addressed;
pub use content_addressed::*;

mod measure;
pub use measure::*;

mod memory;
pub use memory::*;

/// A [BlockStore] is a facade over some storage substrate that is capable
/// of storing and retrieving opaque byte blocks by their address.
///
/// The core tree engine treats a missing address as fatal for the current
/// traversal; any retry or fallback policy belongs in a [BlockStore]
/// implementation (only the store can know whether a miss is transient).
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait BlockStore: Clone {
    /// The address type used by this [BlockStore]
    type Address: ConditionalSync;
    /// The block byte representation stored by this [BlockStore]
    type Bytes: ConditionalSend;
    /// The error type produced by this [BlockStore]
    type Error: Into<TidemarkStorageError>;

    /// Store the given block bytes against the given address
    async fn put(&mut self, address: Self::Address, bytes: Self::Bytes)
    -> Result<(), Self::Error>;
    /// Retrieve the block bytes (if any) stored against the given address
    async fn get(&self, address: &Self::Address) -> Result<Option<Self::Bytes>, Self::Error>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<T> BlockStore for Arc<Mutex<T>>
where
    T: BlockStore + ConditionalSend,
{
    type Address = T::Address;
    type Bytes = T::Bytes;
    type Error = T::Error;

    async fn put(
        &mut self,
        address: Self::Address,
        bytes: Self::Bytes,
    ) -> Result<(), Self::Error> {
        let mut inner = self.lock().await;
        inner.put(address, bytes).await
    }

    async fn get(&self, address: &Self::Address) -> Result<Option<Self::Bytes>, Self::Error> {
        let inner = self.lock().await;
        inner.get(address).await
    }
}

/// A universal envelope for all compatible combinations of [Encoder] and
/// [BlockStore] implementations. See the crate documentation for a
/// practical example of usage.
#[derive(Clone)]
pub struct Storage<Encoder, Backend>
where
    Encoder: crate::Encoder,
    Backend: BlockStore,
{
    /// The [Encoder] used by the [Storage]
    pub encoder: Encoder,
    /// The [BlockStore] used by the [Storage]
    pub backend: Backend,
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Encoder, Backend> crate::Encoder for Storage<Encoder, Backend>
where
    Encoder: crate::Encoder,
    Backend: BlockStore,
    Self: ConditionalSync,
{
    type Bytes = Encoder::Bytes;
    type Hash = Encoder::Hash;
    type Error = Encoder::Error;

    async fn encode<T>(&self, block: &T) -> Result<(Self::Hash, Self::Bytes), Self::Error>
    where
        T: serde::Serialize + ConditionalSync + std::fmt::Debug,
    {
        self.encoder.encode(block).await
    }

    async fn decode<T>(&self, bytes: &[u8]) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned + ConditionalSync,
    {
        self.encoder.decode(bytes).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Encoder, Backend> BlockStore for Storage<Encoder, Backend>
where
    Encoder: crate::Encoder,
    Backend: BlockStore,
    Self: ConditionalSync,
{
    type Address = Backend::Address;
    type Bytes = Backend::Bytes;
    type Error = Backend::Error;

    async fn put(
        &mut self,
        address: Self::Address,
        bytes: Self::Bytes,
    ) -> Result<(), Self::Error> {
        self.backend.put(address, bytes).await
    }

    async fn get(&self, address: &Self::Address) -> Result<Option<Self::Bytes>, Self::Error> {
        self.backend.get(address).await
    }
}
