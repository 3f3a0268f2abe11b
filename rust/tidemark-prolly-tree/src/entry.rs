use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{KeyType, Tuple, ValueType};

/// An [`Entry`] is a single tuple/value pair stored at the leaf level of
/// a [`crate::ProllyTree`]. Entries order by tuple alone; the value
/// never participates in ordering.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Entry<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    /// The ordering key of this entry
    pub tuple: Tuple<Key>,
    /// The stored value
    pub value: Value,
}

impl<Key, Value> Entry<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    /// Construct an [`Entry`] from its parts
    pub fn new(tuple: Tuple<Key>, value: Value) -> Self {
        Self { tuple, value }
    }
}

impl<Key, Value> Ord for Entry<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.tuple.cmp(&other.tuple)
    }
}

impl<Key, Value> PartialOrd for Entry<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
