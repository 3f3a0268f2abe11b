use base58::ToBase58;
use serde::{Deserialize, Serialize};
use tidemark_storage::HashType;

use crate::{KeyType, Tuple};

/// A [`Reference`] points from a non-leaf [`crate::Bucket`] at some
/// child bucket one level down. It carries the first tuple of the child
/// so the child's domain can be decided without fetching it, and the
/// content address of the child so it can be fetched when needed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Reference<Key, Hash>
where
    Key: KeyType,
    Hash: HashType,
{
    tuple: Tuple<Key>,
    hash: Hash,
}

impl<Key, Hash> Reference<Key, Hash>
where
    Key: KeyType,
    Hash: HashType,
{
    /// Construct a [`Reference`] from the first tuple and the content
    /// address of a child bucket
    pub fn new(tuple: Tuple<Key>, hash: Hash) -> Self {
        Self { tuple, hash }
    }

    /// The first tuple of the referenced bucket
    pub fn tuple(&self) -> &Tuple<Key> {
        &self.tuple
    }

    /// The content address of the referenced bucket
    pub fn hash(&self) -> &Hash {
        &self.hash
    }
}

impl<Key, Hash> std::fmt::Display for Reference<Key, Hash>
where
    Key: KeyType,
    Hash: HashType,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.tuple, self.hash.as_ref().to_base58())
    }
}
