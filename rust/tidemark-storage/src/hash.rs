use base58::ToBase58;
use serde::{Serialize, de::DeserializeOwned};
use tidemark_common::ConditionalSync;

/// The common digest type used as the address of stored blocks: a BLAKE3
/// hash of a block's canonical encoding.
pub type Blake3Hash = [u8; 32];

/// A trait implemented by types that represent a content digest. A blanket
/// implementation is provided for any byte-backed type matching the
/// serialization bounds.
pub trait HashType:
    Clone + AsRef<[u8]> + ConditionalSync + Serialize + DeserializeOwned + std::fmt::Debug + Eq
{
    /// Format the hash as a short display string
    fn display(&self) -> String {
        format!("#{}...", self.as_ref()[0..6.min(self.as_ref().len())].to_base58())
    }
}

impl<T> HashType for T where
    T: Clone
        + AsRef<[u8]>
        + ConditionalSync
        + Serialize
        + DeserializeOwned
        + std::fmt::Debug
        + PartialEq
        + Eq
{
}
