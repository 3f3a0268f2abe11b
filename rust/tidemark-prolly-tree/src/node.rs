use serde::{Deserialize, Serialize};
use tidemark_storage::HashType;

use crate::{Entry, KeyType, Reference, TidemarkProllyTreeError, Tuple, ValueType};

/// A [`Node`] is one slot of a [`crate::Bucket`]: a leaf [`Entry`] when
/// the bucket is at level zero, or a [`Reference`] to a child bucket at
/// every level above.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Node<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// A tuple/value pair; only legal at level zero
    Entry(Entry<Key, Value>),
    /// A pointer to a child bucket; only legal above level zero
    Reference(Reference<Key, Hash>),
}

impl<Key, Value, Hash> Node<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// The tuple this node is ordered by: the entry's own tuple at the
    /// leaf level, or the first tuple of the referenced child above it.
    pub fn tuple(&self) -> &Tuple<Key> {
        match self {
            Node::Entry(entry) => &entry.tuple,
            Node::Reference(reference) => reference.tuple(),
        }
    }

    /// The key component of this node's tuple
    pub fn key(&self) -> &Key {
        &self.tuple().key
    }

    /// Borrow the [`Entry`] held by this node, failing if the node is a
    /// [`Reference`]
    pub fn entry(&self) -> Result<&Entry<Key, Value>, TidemarkProllyTreeError> {
        match self {
            Node::Entry(entry) => Ok(entry),
            Node::Reference(reference) => Err(TidemarkProllyTreeError::UnexpectedShape(format!(
                "Expected an entry, found a reference: {reference}"
            ))),
        }
    }

    /// Take the [`Entry`] held by this node, failing if the node is a
    /// [`Reference`]
    pub fn into_entry(self) -> Result<Entry<Key, Value>, TidemarkProllyTreeError> {
        match self {
            Node::Entry(entry) => Ok(entry),
            Node::Reference(reference) => Err(TidemarkProllyTreeError::UnexpectedShape(format!(
                "Expected an entry, found a reference: {reference}"
            ))),
        }
    }

    /// Borrow the [`Reference`] held by this node, failing if the node
    /// is an [`Entry`]
    pub fn reference(&self) -> Result<&Reference<Key, Hash>, TidemarkProllyTreeError> {
        match self {
            Node::Reference(reference) => Ok(reference),
            Node::Entry(entry) => Err(TidemarkProllyTreeError::UnexpectedShape(format!(
                "Expected a reference, found an entry at {}",
                entry.tuple
            ))),
        }
    }
}
