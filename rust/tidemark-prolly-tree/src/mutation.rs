use std::collections::BTreeMap;

use nonempty::NonEmpty;
use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{
    AddressedBucket, Boundary, Bucket, Cursor, Entry, KeyType, MAX_LEVEL, Node, ProllyTree,
    TidemarkProllyTreeError, Tuple, ValueType,
};

/// A single requested change to the entries of a [`ProllyTree`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Change<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    /// Insert the entry, or replace the value already stored at its
    /// tuple
    Put(Entry<Key, Value>),
    /// Remove whatever entry is stored at the tuple; removing an absent
    /// tuple is a no-op
    Del(Tuple<Key>),
}

impl<Key, Value> Change<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    /// The tuple this change applies to
    pub fn tuple(&self) -> &Tuple<Key> {
        match self {
            Change::Put(entry) => &entry.tuple,
            Change::Del(tuple) => tuple,
        }
    }
}

/// A change propagating up one level of the tree during a rebuild: a
/// node to place, or a tuple whose node disappears.
enum Update<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    Put(Node<Key, Value, Hash>),
    Del(Tuple<Key>),
}

impl<Key, Value, Hash> Update<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    fn tuple(&self) -> &Tuple<Key> {
        match self {
            Update::Put(node) => node.tuple(),
            Update::Del(tuple) => tuple,
        }
    }
}

/// Validate the ordering contract of a batched mutation and flatten it
/// into a single sorted run of changes.
///
/// Each batch must be strictly ascending; consecutive batches must not
/// sort backwards relative to each other. When the same tuple appears in
/// more than one batch the later batch wins.
fn flatten_batches<Key, Value>(
    batches: Vec<Vec<Change<Key, Value>>>,
) -> Result<Vec<Change<Key, Value>>, TidemarkProllyTreeError>
where
    Key: KeyType,
    Value: ValueType,
{
    let mut flattened: Vec<Change<Key, Value>> = Vec::new();

    for batch in batches {
        for pair in batch.windows(2) {
            if pair[1].tuple() <= pair[0].tuple() {
                return Err(TidemarkProllyTreeError::UnsortedInput(format!(
                    "Change at {} does not sort after {}",
                    pair[1].tuple(),
                    pair[0].tuple()
                )));
            }
        }

        if let (Some(last), Some(first)) = (flattened.last(), batch.first())
            && first.tuple() < last.tuple()
        {
            return Err(TidemarkProllyTreeError::UnsortedInput(format!(
                "Batch starting at {} sorts before the previous batch ending at {}",
                first.tuple(),
                last.tuple()
            )));
        }

        for change in batch {
            match flattened.last() {
                // Later batches override earlier ones at the same tuple
                Some(last) if last.tuple() == change.tuple() => {
                    if let Some(slot) = flattened.last_mut() {
                        *slot = change;
                    }
                }
                _ => flattened.push(change),
            }
        }
    }

    Ok(flattened)
}

/// Merge a sorted run of existing nodes with a sorted run of updates,
/// appending the merged result to `pending`. A `Put` at an existing
/// tuple replaces that node; a `Del` drops it.
fn merge_nodes<Key, Value, Hash>(
    pending: &mut Vec<Node<Key, Value, Hash>>,
    existing: Vec<Node<Key, Value, Hash>>,
    updates: Vec<Update<Key, Value, Hash>>,
) where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    let mut existing = existing.into_iter().peekable();
    let mut updates = updates.into_iter().peekable();

    loop {
        let ordering = match (existing.peek(), updates.peek()) {
            (Some(node), Some(update)) => node.tuple().cmp(update.tuple()),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };

        match ordering {
            std::cmp::Ordering::Less => {
                if let Some(node) = existing.next() {
                    pending.push(node);
                }
            }
            std::cmp::Ordering::Greater => {
                if let Some(Update::Put(node)) = updates.next() {
                    pending.push(node);
                }
            }
            std::cmp::Ordering::Equal => {
                existing.next();

                if let Some(Update::Put(node)) = updates.next() {
                    pending.push(node);
                }
            }
        }
    }
}

/// Cut every complete bucket off the front of `pending`, storing each
/// and collecting it into `out`. Nodes after the last boundary remain
/// pending for the caller to carry forward.
async fn chunk_pending<Chunker, Key, Value, Hash, Storage>(
    storage: &mut Storage,
    pending: &mut Vec<Node<Key, Value, Hash>>,
    average: u32,
    level: u32,
    out: &mut Vec<AddressedBucket<Key, Value, Hash>>,
) -> Result<(), TidemarkProllyTreeError>
where
    Chunker: Boundary<Key>,
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    let mut start = 0;

    for index in 0..pending.len() {
        if Chunker::is_boundary(average, level, &pending[index].tuple().key) {
            let run = pending[start..=index].to_vec();
            let nodes = NonEmpty::from_vec(run).ok_or_else(|| {
                TidemarkProllyTreeError::InvalidState("Chunked an empty node run".into())
            })?;

            out.push(AddressedBucket::store(Bucket::new(average, level, nodes), storage).await?);
            start = index + 1;
        }
    }

    pending.drain(..start);

    Ok(())
}

/// Flush whatever nodes remain pending into one final, boundary-less
/// bucket. Only valid at the tail of a level.
async fn flush_pending<Key, Value, Hash, Storage>(
    storage: &mut Storage,
    pending: &mut Vec<Node<Key, Value, Hash>>,
    average: u32,
    level: u32,
    out: &mut Vec<AddressedBucket<Key, Value, Hash>>,
) -> Result<(), TidemarkProllyTreeError>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    if let Some(nodes) = NonEmpty::from_vec(std::mem::take(pending)) {
        out.push(AddressedBucket::store(Bucket::new(average, level, nodes), storage).await?);
    }

    Ok(())
}

/// Rebuild one level of the tree, applying the given updates.
///
/// Walks only the buckets whose domains the updates touch, carrying
/// unchunked nodes forward between adjacent touched buckets, and
/// reattaches to the untouched tail as soon as a chunk boundary realigns
/// with the original bucketing. Returns the buckets written and the
/// buckets displaced.
#[allow(clippy::type_complexity)]
async fn rebuild_level<Chunker, Key, Value, Hash, Storage>(
    storage: &mut Storage,
    tree: &ProllyTree<Key, Value, Hash>,
    level: u32,
    updates: Vec<Update<Key, Value, Hash>>,
) -> Result<
    (
        Vec<AddressedBucket<Key, Value, Hash>>,
        Vec<AddressedBucket<Key, Value, Hash>>,
    ),
    TidemarkProllyTreeError,
>
where
    Chunker: Boundary<Key>,
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    let average = tree.average();
    let mut added = Vec::new();
    let mut removed: Vec<AddressedBucket<Key, Value, Hash>> = Vec::new();
    let mut pending: Vec<Node<Key, Value, Hash>> = Vec::new();
    let mut updates = updates.into_iter().peekable();

    let mut cursor = Cursor::new(tree);

    let mut source = match updates.peek() {
        Some(update) if !tree.is_empty() => {
            cursor
                .seek_domain(&*storage, update.tuple(), level)
                .await?;
            Some(cursor.current_bucket()?.clone())
        }
        _ => None,
    };

    while let Some(bucket) = source.take() {
        let last_tuple = bucket.bucket().last_tuple().cloned().ok_or_else(|| {
            TidemarkProllyTreeError::UnexpectedShape(
                "Encountered an empty bucket below the root".into(),
            )
        })?;

        // Every update that lands at or below this bucket's last tuple
        // applies here
        let mut applicable = Vec::new();

        while updates
            .peek()
            .map(|update| *update.tuple() <= last_tuple)
            .unwrap_or(false)
        {
            if let Some(update) = updates.next() {
                applicable.push(update);
            }
        }

        removed.push(bucket.clone());
        merge_nodes(&mut pending, bucket.into_bucket().into_nodes(), applicable);
        chunk_pending::<Chunker, _, _, _, _>(storage, &mut pending, average, level, &mut added)
            .await?;

        source = if pending.is_empty() {
            match updates.peek() {
                Some(update) => {
                    // Chunking realigned with the original bucketing, so
                    // jump straight to the next touched domain
                    let target = update.tuple().clone();
                    cursor.seek_domain(&*storage, &target, level).await?;

                    let candidate = cursor.current_bucket()?.clone();
                    let same = removed
                        .last()
                        .map(|consumed| consumed.hash() == candidate.hash())
                        .unwrap_or(false);

                    if !same {
                        Some(candidate)
                    } else if cursor.advance_bucket(&*storage).await? {
                        // The change falls in the gap past this bucket's
                        // closing boundary; the following bucket absorbs
                        // it
                        Some(cursor.current_bucket()?.clone())
                    } else {
                        None
                    }
                }
                None => None,
            }
        } else {
            // A dangling run must be merged into whatever bucket comes
            // next, boundary-changed or not
            if cursor.advance_bucket(&*storage).await? {
                Some(cursor.current_bucket()?.clone())
            } else {
                None
            }
        };
    }

    // Updates beyond the last existing bucket (or into an empty tree)
    for update in updates {
        if let Update::Put(node) = update {
            pending.push(node);
        }
    }

    chunk_pending::<Chunker, _, _, _, _>(storage, &mut pending, average, level, &mut added)
        .await?;
    flush_pending(storage, &mut pending, average, level, &mut added).await?;

    Ok((added, removed))
}

/// Convert the bucket-level outcome of one rebuilt level into the
/// updates for the level above, cancelling out buckets that were
/// rewritten to an identical address.
fn propagate_updates<Key, Value, Hash>(
    added: &[AddressedBucket<Key, Value, Hash>],
    removed: &[AddressedBucket<Key, Value, Hash>],
) -> Result<Vec<Update<Key, Value, Hash>>, TidemarkProllyTreeError>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    let mut ops: BTreeMap<Tuple<Key>, Update<Key, Value, Hash>> = BTreeMap::new();
    let mut removed_hashes: BTreeMap<Tuple<Key>, Hash> = BTreeMap::new();

    for bucket in removed {
        let reference = bucket.reference()?;
        removed_hashes.insert(reference.tuple().clone(), reference.hash().clone());
        ops.insert(
            reference.tuple().clone(),
            Update::Del(reference.tuple().clone()),
        );
    }

    for bucket in added {
        let reference = bucket.reference()?;

        if removed_hashes.get(reference.tuple()) == Some(reference.hash()) {
            // The bucket came back byte-identical: nothing changes above
            ops.remove(reference.tuple());
            continue;
        }

        ops.insert(
            reference.tuple().clone(),
            Update::Put(Node::Reference(reference)),
        );
    }

    Ok(ops.into_values().collect())
}

/// Apply a batched mutation to a tree, producing the new tree.
///
/// The original tree is untouched; every rewritten bucket is stored as a
/// new block and unchanged subtrees are shared between the two roots.
/// An empty mutation (or one that cancels out entirely, such as deleting
/// absent tuples) returns a tree with the same root address.
pub async fn mutate<Chunker, Key, Value, Hash, Storage>(
    storage: &mut Storage,
    tree: &ProllyTree<Key, Value, Hash>,
    batches: Vec<Vec<Change<Key, Value>>>,
) -> Result<ProllyTree<Key, Value, Hash>, TidemarkProllyTreeError>
where
    Chunker: Boundary<Key>,
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    let changes = flatten_batches(batches)?;

    if changes.is_empty() {
        return Ok(tree.clone());
    }

    let average = tree.average();
    let root_level = tree.root().bucket().level();

    let mut updates: Vec<Update<Key, Value, Hash>> = changes
        .into_iter()
        .map(|change| match change {
            Change::Put(entry) => Update::Put(Node::Entry(entry)),
            Change::Del(tuple) => Update::Del(tuple),
        })
        .collect();

    // Rebuild the existing levels bottom-up, stopping early when a
    // level comes back unchanged
    let mut level = 0;
    let mut candidates;

    loop {
        let (added, removed) =
            rebuild_level::<Chunker, _, _, _, _>(storage, tree, level, updates).await?;

        if level == root_level {
            candidates = added;
            break;
        }

        updates = propagate_updates(&added, &removed)?;

        if updates.is_empty() {
            return Ok(tree.clone());
        }

        level += 1;
    }

    // Everything at the old root level was rebuilt; chunk upward until
    // a single root bucket remains
    let mut level = root_level;

    let mut root = loop {
        match candidates.len() {
            0 => {
                // Every entry was deleted
                break AddressedBucket::store(Bucket::empty(average), storage).await?;
            }
            1 => {
                if let Some(root) = candidates.pop() {
                    break root;
                }
            }
            _ => {
                let width = candidates.len();
                level += 1;

                let nodes = candidates
                    .iter()
                    .map(|bucket| Ok(Node::Reference(bucket.reference()?)))
                    .collect::<Result<Vec<_>, TidemarkProllyTreeError>>()?;

                let mut pending = nodes;
                let mut chunked = Vec::new();

                chunk_pending::<Chunker, _, _, _, _>(
                    storage,
                    &mut pending,
                    average,
                    level,
                    &mut chunked,
                )
                .await?;
                flush_pending(storage, &mut pending, average, level, &mut chunked).await?;

                candidates = chunked;

                // Above the saturation level the boundary decisions
                // repeat identically at every further level, so a round
                // up there that fails to narrow the tree can never
                // converge on a single root
                if level > MAX_LEVEL && candidates.len() >= width {
                    return Err(TidemarkProllyTreeError::UnexpectedShape(format!(
                        "Chunking stopped converging at level {level}: \
                         {width} buckets rechunked into {}",
                        candidates.len()
                    )));
                }
            }
        }
    };

    // A single-reference spine on top carries no information; shrink
    // down to the first bucket that branches
    while root.bucket().level() > 0 && root.bucket().len() == 1 {
        let child = {
            let node = root.bucket().nodes().first().ok_or_else(|| {
                TidemarkProllyTreeError::InvalidState("Single-node bucket had no nodes".into())
            })?;

            node.reference()?.hash().clone()
        };

        root = AddressedBucket::fetch(&child, &*storage).await?;
    }

    Ok(ProllyTree::from_root(root))
}
