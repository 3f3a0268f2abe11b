use async_stream::try_stream;
use futures_core::Stream;
use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{
    Cursor, Entry, KeyType, ProllyTree, TidemarkProllyTreeError, Tuple, ValueType,
};

/// The outcome of looking up a single tuple
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchResult<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    /// The tuple is present; its entry is attached
    Found(Entry<Key, Value>),
    /// The tuple is absent
    NotFound(Tuple<Key>),
}

/// Look up a batch of tuples in one pass over the tree.
///
/// Tuples must be given in strictly ascending order, which lets the
/// whole batch ride a single forward-only [`Cursor`]: each shared bucket
/// along the way is fetched at most once no matter how many tuples fall
/// into it. Results are yielded lazily, one per requested tuple, in
/// request order.
pub fn search<'a, Key, Value, Hash, Storage>(
    storage: &'a Storage,
    tree: &'a ProllyTree<Key, Value, Hash>,
    tuples: Vec<Tuple<Key>>,
) -> impl Stream<Item = Result<SearchResult<Key, Value>, TidemarkProllyTreeError>> + 'a
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    try_stream! {
        let mut cursor = Cursor::new(tree);
        let mut previous: Option<Tuple<Key>> = None;

        for tuple in tuples {
            if let Some(previous) = &previous
                && tuple <= *previous
            {
                Err(TidemarkProllyTreeError::UnsortedInput(format!(
                    "Search tuple {tuple} does not sort after {previous}"
                )))?;
            }

            previous = Some(tuple.clone());

            if !cursor.done() {
                cursor.next_tuple(storage, &tuple, 0).await?;
            }

            if cursor.done() {
                yield SearchResult::NotFound(tuple);
                continue;
            }

            let node = cursor.current()?;

            if *node.tuple() == tuple {
                yield SearchResult::Found(node.entry()?.clone());
            } else {
                yield SearchResult::NotFound(tuple);
            }
        }
    }
}
