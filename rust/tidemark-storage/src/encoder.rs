use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tidemark_common::ConditionalSync;

use crate::{HashType, TidemarkStorageError};

mod cbor;
pub use cbor::*;

/// An [Encoder] converts blocks to and from content-addressable bytes.
///
/// The digest produced by [Encoder::encode] is the address of the block:
/// two blocks with identical logical content always produce the same
/// bytes, and therefore the same address.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Encoder: Clone {
    /// The encoded byte representation of a block
    type Bytes: AsRef<[u8]> + 'static + ConditionalSync;
    /// The hash type produced by this [Encoder]
    type Hash: HashType + ConditionalSync;
    /// The error type produced by this [Encoder]
    type Error: Into<TidemarkStorageError>;

    /// Encode a serializable block into its address and its bytes.
    async fn encode<T>(&self, block: &T) -> Result<(Self::Hash, Self::Bytes), Self::Error>
    where
        T: Serialize + ConditionalSync + std::fmt::Debug;

    /// Decode bytes into some deserializable block type.
    async fn decode<T>(&self, bytes: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned + ConditionalSync;
}
