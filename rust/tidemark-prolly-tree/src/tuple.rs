use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::KeyType;

/// The sequence component of a [`Tuple`] carried by the minimum
/// sentinel. It sorts before every application-assigned sequence, which
/// are required to be non-negative.
const MIN_SEQ: i64 = -1;

/// The composite ordering key of every entry in a
/// [`crate::ProllyTree`]: a numeric sequence paired with a byte key.
///
/// Tuples order by sequence first and break ties on the raw bytes of
/// the key, so a single tree can hold many key spaces side by side
/// without their keys interleaving.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Tuple<Key>
where
    Key: KeyType,
{
    /// The major ordering component
    pub seq: i64,
    /// The minor ordering component
    pub key: Key,
}

impl<Key> Tuple<Key>
where
    Key: KeyType,
{
    /// Construct a [`Tuple`] from its parts
    pub fn new(seq: i64, key: Key) -> Self {
        Self { seq, key }
    }

    /// The sentinel that sorts before every tuple a caller can
    /// legitimately store. Seeking a cursor to it lands on the first
    /// entry of the tree.
    pub fn min() -> Self {
        Self {
            seq: MIN_SEQ,
            key: Key::default(),
        }
    }
}

impl<Key> Ord for Tuple<Key>
where
    Key: KeyType,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.key.bytes().cmp(other.key.bytes()))
    }
}

impl<Key> PartialOrd for Tuple<Key>
where
    Key: KeyType,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Key> std::fmt::Display for Tuple<Key>
where
    Key: KeyType,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {:?})", self.seq, self.key)
    }
}
