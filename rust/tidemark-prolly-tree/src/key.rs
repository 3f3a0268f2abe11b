use serde::{Serialize, de::DeserializeOwned};
use tidemark_common::ConditionalSync;

/// A key used to order entries in a [`crate::ProllyTree`].
///
/// Keys are compared by their raw bytes (lexicographically); the
/// [`Default`] value must be the empty key, which participates in the
/// minimum tuple sentinel.
pub trait KeyType:
    std::fmt::Debug
    + Clone
    + Default
    + PartialEq
    + Eq
    + Ord
    + ConditionalSync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Get the raw bytes of this [`KeyType`]
    fn bytes(&self) -> &[u8];
}

impl KeyType for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self.as_ref()
    }
}

/// A value that may be stored at the leaf level of a [`crate::ProllyTree`].
pub trait ValueType:
    std::fmt::Debug + Clone + Eq + ConditionalSync + Serialize + DeserializeOwned + 'static
{
}

impl ValueType for Vec<u8> {}
