use std::cmp::Ordering;

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{KeyType, Node, Reference, TidemarkProllyTreeError, Tuple, ValueType};

/// A [`Bucket`] is the unit of storage of a [`crate::ProllyTree`]: a
/// run of sorted [`Node`]s at a single level, delimited by the chunking
/// boundary. It is the only shape that is ever encoded and written to a
/// block store.
///
/// Invariants upheld by the construction sites in this crate:
///
///  * nodes are strictly ascending by tuple
///  * a level-zero bucket holds only entries, every other level holds
///    only references
///  * only the root bucket of an empty tree may have zero nodes
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Bucket<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    average: u32,
    level: u32,
    nodes: Vec<Node<Key, Value, Hash>>,
}

impl<Key, Value, Hash> Bucket<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// The root bucket of an empty tree
    pub fn empty(average: u32) -> Self {
        Self {
            average,
            level: 0,
            nodes: Vec::new(),
        }
    }

    /// Construct a [`Bucket`] from a non-empty run of nodes
    pub fn new(average: u32, level: u32, nodes: NonEmpty<Node<Key, Value, Hash>>) -> Self {
        let nodes = nodes.into_iter().collect::<Vec<_>>();

        debug_assert!(nodes.is_sorted_by(|a, b| a.tuple() < b.tuple()));

        Self {
            average,
            level,
            nodes,
        }
    }

    /// The average bucket size this tree was configured with
    pub fn average(&self) -> u32 {
        self.average
    }

    /// The level of this bucket; level zero holds entries
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The nodes of this bucket in tuple order
    pub fn nodes(&self) -> &[Node<Key, Value, Hash>] {
        &self.nodes
    }

    /// Consume this bucket, yielding its nodes
    pub fn into_nodes(self) -> Vec<Node<Key, Value, Hash>> {
        self.nodes
    }

    /// The number of nodes in this bucket
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether this bucket holds no nodes at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The lowest tuple in this bucket, if any
    pub fn first_tuple(&self) -> Option<&Tuple<Key>> {
        self.nodes.first().map(|node| node.tuple())
    }

    /// The highest tuple in this bucket, if any
    pub fn last_tuple(&self) -> Option<&Tuple<Key>> {
        self.nodes.last().map(|node| node.tuple())
    }

    /// The index of the node whose domain covers the target: the last
    /// node whose tuple is less than or equal to the target. Falls back
    /// to the first node when the target sorts before everything here.
    pub fn find_domain_index(&self, target: &Tuple<Key>) -> usize {
        let preceding = self.nodes.partition_point(|node| node.tuple() <= target);
        preceding.saturating_sub(1)
    }

    /// The index of the first node whose tuple is greater than or equal
    /// to the target; `len()` when every node sorts below it.
    pub fn find_tuple_index(&self, target: &Tuple<Key>) -> usize {
        self.nodes.partition_point(|node| node.tuple() < target)
    }

    /// Look up the node with exactly the given tuple
    pub fn get(&self, tuple: &Tuple<Key>) -> Option<&Node<Key, Value, Hash>> {
        let index = self.find_tuple_index(tuple);
        self.nodes
            .get(index)
            .filter(|node| node.tuple() == tuple)
    }
}

impl<Key, Value, Hash> Ord for Bucket<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.first_tuple()
            .cmp(&other.first_tuple())
            .then_with(|| self.level.cmp(&other.level))
    }
}

impl<Key, Value, Hash> PartialOrd for Bucket<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A [`Bucket`] paired with the content address it was stored (or
/// fetched) under.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressedBucket<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    bucket: Bucket<Key, Value, Hash>,
    hash: Hash,
}

impl<Key, Value, Hash> AddressedBucket<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// Persist the given bucket, pairing it with the address the store
    /// assigned to it
    pub async fn store<Storage>(
        bucket: Bucket<Key, Value, Hash>,
        storage: &mut Storage,
    ) -> Result<Self, TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        let hash = storage
            .write(&bucket)
            .await
            .map_err(|error| TidemarkProllyTreeError::Storage(error.into()))?;

        Ok(Self { bucket, hash })
    }

    /// Fetch the bucket stored at the given address, failing with
    /// [`TidemarkProllyTreeError::BucketNotFound`] if the store does not
    /// have it
    pub async fn fetch<Storage>(
        hash: &Hash,
        storage: &Storage,
    ) -> Result<Self, TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        let bucket = storage
            .read::<Bucket<Key, Value, Hash>>(hash)
            .await
            .map_err(|error| TidemarkProllyTreeError::Storage(error.into()))?
            .ok_or_else(|| TidemarkProllyTreeError::BucketNotFound(hash.display()))?;

        Ok(Self {
            bucket,
            hash: hash.clone(),
        })
    }

    /// The bucket itself
    pub fn bucket(&self) -> &Bucket<Key, Value, Hash> {
        &self.bucket
    }

    /// Consume this pair, yielding the bucket
    pub fn into_bucket(self) -> Bucket<Key, Value, Hash> {
        self.bucket
    }

    /// The content address of the bucket
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// A [`Reference`] suitable for embedding in a parent bucket one
    /// level up; fails on the (empty) root bucket of an empty tree,
    /// which is never referenced by a parent.
    pub fn reference(&self) -> Result<Reference<Key, Hash>, TidemarkProllyTreeError> {
        let tuple = self.bucket.first_tuple().ok_or_else(|| {
            TidemarkProllyTreeError::UnexpectedShape(
                "An empty bucket cannot be referenced".into(),
            )
        })?;

        Ok(Reference::new(tuple.clone(), self.hash.clone()))
    }
}

#[cfg(test)]
mod tests {
    use nonempty::nonempty;

    use super::*;
    use crate::{Entry, Node, Tuple};

    type TestNode = Node<Vec<u8>, Vec<u8>, [u8; 32]>;

    fn entry(seq: i64, key: &str) -> TestNode {
        Node::Entry(Entry::new(
            Tuple::new(seq, key.as_bytes().to_vec()),
            b"value".to_vec(),
        ))
    }

    fn bucket() -> Bucket<Vec<u8>, Vec<u8>, [u8; 32]> {
        Bucket::new(
            32,
            0,
            nonempty![entry(1, "a"), entry(1, "c"), entry(2, "a")],
        )
    }

    #[test]
    fn it_finds_the_covering_domain_index() {
        let bucket = bucket();

        // Before everything: clamped to the first node
        assert_eq!(bucket.find_domain_index(&Tuple::new(0, b"z".to_vec())), 0);
        // Exact hit
        assert_eq!(bucket.find_domain_index(&Tuple::new(1, b"c".to_vec())), 1);
        // Between nodes: the last node at or below the target
        assert_eq!(bucket.find_domain_index(&Tuple::new(1, b"d".to_vec())), 1);
        // After everything
        assert_eq!(bucket.find_domain_index(&Tuple::new(9, b"a".to_vec())), 2);
    }

    #[test]
    fn it_finds_the_first_node_at_or_after_a_target() {
        let bucket = bucket();

        assert_eq!(bucket.find_tuple_index(&Tuple::min()), 0);
        assert_eq!(bucket.find_tuple_index(&Tuple::new(1, b"b".to_vec())), 1);
        assert_eq!(bucket.find_tuple_index(&Tuple::new(9, b"a".to_vec())), 3);
    }

    #[test]
    fn it_looks_up_exact_tuples() {
        let bucket = bucket();

        assert!(bucket.get(&Tuple::new(1, b"c".to_vec())).is_some());
        assert!(bucket.get(&Tuple::new(1, b"b".to_vec())).is_none());
    }
}
