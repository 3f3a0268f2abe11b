use async_stream::try_stream;
use futures_core::Stream;
use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{
    AddressedBucket, Bucket, Cursor, Entry, KeyType, TidemarkProllyTreeError, Tuple, ValueType,
};

/// A persistent, content-addressed search tree over sorted
/// [`Entry`]s.
///
/// Every tree is just a handle on its root bucket; all other state
/// lives in a [`ContentAddressedStorage`] and is fetched on demand.
/// Trees are never modified in place: [`crate::mutate`] produces a new
/// tree whose unchanged subtrees are shared with the old one, and two
/// trees holding the same entries always converge on the same root
/// address regardless of the mutations that produced them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProllyTree<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    root: AddressedBucket<Key, Value, Hash>,
}

impl<Key, Value, Hash> ProllyTree<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// Construct (and persist the root of) an empty tree with the given
    /// average bucket size. The average is fixed for the lifetime of
    /// the tree and all trees derived from it.
    pub async fn empty<Storage>(
        average: u32,
        storage: &mut Storage,
    ) -> Result<Self, TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        let root = AddressedBucket::store(Bucket::empty(average), storage).await?;

        Ok(Self { root })
    }

    /// Rehydrate a tree from the address of its root bucket
    pub async fn from_hash<Storage>(
        hash: &Hash,
        storage: &Storage,
    ) -> Result<Self, TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        let root = AddressedBucket::fetch(hash, storage).await?;

        Ok(Self { root })
    }

    pub(crate) fn from_root(root: AddressedBucket<Key, Value, Hash>) -> Self {
        Self { root }
    }

    /// The root bucket of this tree
    pub fn root(&self) -> &AddressedBucket<Key, Value, Hash> {
        &self.root
    }

    /// The content address that identifies this tree as a whole
    pub fn hash(&self) -> &Hash {
        self.root.hash()
    }

    /// The average bucket size this tree was configured with
    pub fn average(&self) -> u32 {
        self.root.bucket().average()
    }

    /// Whether this tree holds no entries
    pub fn is_empty(&self) -> bool {
        self.root.bucket().is_empty()
    }

    /// Stream every entry of the tree in ascending tuple order
    pub fn stream<'a, Storage>(
        &'a self,
        storage: &'a Storage,
    ) -> impl Stream<Item = Result<Entry<Key, Value>, TidemarkProllyTreeError>> + 'a
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        try_stream! {
            let mut cursor = Cursor::new(self);

            if !cursor.done() {
                cursor.next_tuple(storage, &Tuple::min(), 0).await?;
            }

            while !cursor.done() {
                let entry = cursor.current()?.entry()?.clone();
                yield entry;

                cursor.advance(storage).await?;
            }
        }
    }
}
