use std::marker::PhantomData;

use futures_util::{StreamExt, pin_mut};
use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{
    Boundary, Change, Entry, ProllyTree, SearchResult, TidemarkProllyTreeError, Tuple, mutate,
    search,
};

/// A flat byte-keyed key/value store layered over a [`ProllyTree`].
///
/// The tree orders entries by `(seq, key)`; a flat store has no natural
/// sequence, so one is derived from the key itself: the first four bytes
/// of the key's BLAKE3 digest, interpreted as a big-endian integer. The
/// derivation is deterministic, needs no auxiliary index, and spreads
/// keys across the sequence space so no single region of the tree runs
/// hot.
pub struct KvStore<Chunker, Hash, Storage>
where
    Chunker: Boundary<Vec<u8>>,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    tree: ProllyTree<Vec<u8>, Vec<u8>, Hash>,
    storage: Storage,
    chunker: PhantomData<Chunker>,
}

impl<Chunker, Hash, Storage> KvStore<Chunker, Hash, Storage>
where
    Chunker: Boundary<Vec<u8>>,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    /// Create an empty store with the given average bucket size
    pub async fn new(average: u32, mut storage: Storage) -> Result<Self, TidemarkProllyTreeError> {
        let tree = ProllyTree::empty(average, &mut storage).await?;

        Ok(Self {
            tree,
            storage,
            chunker: PhantomData,
        })
    }

    /// Reattach to a store previously persisted under the given root
    /// address
    pub async fn from_hash(hash: &Hash, storage: Storage) -> Result<Self, TidemarkProllyTreeError> {
        let tree = ProllyTree::from_hash(hash, &storage).await?;

        Ok(Self {
            tree,
            storage,
            chunker: PhantomData,
        })
    }

    fn tuple_for(key: &[u8]) -> Tuple<Vec<u8>> {
        let digest = *blake3::hash(key).as_bytes();
        let seq = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as i64;

        Tuple::new(seq, key.to_vec())
    }

    /// Look up the value stored under a key
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TidemarkProllyTreeError> {
        let results = search(&self.storage, &self.tree, vec![Self::tuple_for(key)]);
        pin_mut!(results);

        match results.next().await {
            Some(result) => match result? {
                SearchResult::Found(entry) => Ok(Some(entry.value)),
                SearchResult::NotFound(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Store a value under a key, replacing any previous value
    pub async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TidemarkProllyTreeError> {
        let entry = Entry::new(Self::tuple_for(&key), value);
        let tree = self.tree.clone();

        self.tree = mutate::<Chunker, _, _, _, _>(
            &mut self.storage,
            &tree,
            vec![vec![Change::Put(entry)]],
        )
        .await?;

        Ok(())
    }

    /// Remove a key; removing an absent key is a no-op
    pub async fn delete(&mut self, key: &[u8]) -> Result<(), TidemarkProllyTreeError> {
        let tree = self.tree.clone();

        self.tree = mutate::<Chunker, _, _, _, _>(
            &mut self.storage,
            &tree,
            vec![vec![Change::Del(Self::tuple_for(key))]],
        )
        .await?;

        Ok(())
    }

    /// The content address identifying the current state of the store
    pub fn hash(&self) -> &Hash {
        self.tree.hash()
    }

    /// The tree underlying this store
    pub fn tree(&self) -> &ProllyTree<Vec<u8>, Vec<u8>, Hash> {
        &self.tree
    }
}
