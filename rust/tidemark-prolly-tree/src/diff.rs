use async_stream::try_stream;
use futures_core::Stream;
use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{
    AddressedBucket, Bucket, Entry, KeyType, ProllyTree, Reference, TidemarkProllyTreeError,
    Tuple, ValueType,
};

/// A description of one bucket that exists on only one side of a diff
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BucketInfo<Key, Hash>
where
    Key: KeyType,
    Hash: HashType,
{
    /// The content address of the bucket
    pub hash: Hash,
    /// The level the bucket sits at
    pub level: u32,
    /// The first and last tuples the bucket covers; `None` only for the
    /// empty root of an empty tree
    pub range: Option<(Tuple<Key>, Tuple<Key>)>,
}

/// A bucket present in one tree but not the other
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BucketDiff<Key, Hash>
where
    Key: KeyType,
    Hash: HashType,
{
    /// Present only in the right-hand (new) tree
    Added(BucketInfo<Key, Hash>),
    /// Present only in the left-hand (old) tree
    Removed(BucketInfo<Key, Hash>),
}

/// A single entry-level difference between two trees
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryDiff<Key, Value>
where
    Key: KeyType,
    Value: ValueType,
{
    /// The tuple exists only in the right-hand tree
    Added(Entry<Key, Value>),
    /// The tuple exists only in the left-hand tree
    Removed(Entry<Key, Value>),
    /// The tuple exists in both trees with different values
    Updated {
        /// The tuple both entries share
        tuple: Tuple<Key>,
        /// The value in the left-hand tree
        old: Value,
        /// The value in the right-hand tree
        new: Value,
    },
}

/// One unit of difference yielded by [`diff`]: the entry changes of a
/// maximal run of overlapping leaf buckets, together with the bucket
/// substitutions that carry them.
///
/// A step may have an empty `entries` list when two trees hold the same
/// entries packed into different buckets, and the very first step of a
/// stream carries the non-leaf bucket differences with no entries at
/// all.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffStep<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// Entry-level changes, in ascending tuple order
    pub entries: Vec<EntryDiff<Key, Value>>,
    /// The buckets this step removes and adds
    pub buckets: Vec<BucketDiff<Key, Hash>>,
}

/// One unresolved bucket on the comparison frontier: enough of its
/// identity to order and prune it without fetching its contents.
struct Frontier<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    level: u32,
    tuple: Option<Tuple<Key>>,
    hash: Hash,
    bucket: Option<Bucket<Key, Value, Hash>>,
}

impl<Key, Value, Hash> Frontier<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    fn from_root(root: &AddressedBucket<Key, Value, Hash>) -> Self {
        Self {
            level: root.bucket().level(),
            tuple: root.bucket().first_tuple().cloned(),
            hash: root.hash().clone(),
            bucket: Some(root.bucket().clone()),
        }
    }

    fn from_reference(level: u32, reference: &Reference<Key, Hash>) -> Self {
        Self {
            level,
            tuple: Some(reference.tuple().clone()),
            hash: reference.hash().clone(),
            bucket: None,
        }
    }

    fn sort_key(&self) -> (Option<&Tuple<Key>>, u32) {
        (self.tuple.as_ref(), self.level)
    }

    async fn load<Storage>(
        &mut self,
        storage: &Storage,
    ) -> Result<&Bucket<Key, Value, Hash>, TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        if self.bucket.is_none() {
            let fetched = AddressedBucket::fetch(&self.hash, storage).await?;
            self.bucket = Some(fetched.into_bucket());
        }

        self.bucket.as_ref().ok_or_else(|| {
            TidemarkProllyTreeError::InvalidState("Frontier bucket failed to load".into())
        })
    }
}

fn bucket_info<Key, Value, Hash>(
    hash: &Hash,
    bucket: &Bucket<Key, Value, Hash>,
) -> BucketInfo<Key, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    BucketInfo {
        hash: hash.clone(),
        level: bucket.level(),
        range: bucket
            .first_tuple()
            .cloned()
            .zip(bucket.last_tuple().cloned()),
    }
}

/// Drop every frontier pair that refers to the same bucket on both
/// sides, without fetching anything.
fn prune<Key, Value, Hash>(
    left: Vec<Frontier<Key, Value, Hash>>,
    right: Vec<Frontier<Key, Value, Hash>>,
) -> (Vec<Frontier<Key, Value, Hash>>, Vec<Frontier<Key, Value, Hash>>)
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    let mut kept_left = Vec::with_capacity(left.len());
    let mut kept_right = Vec::with_capacity(right.len());

    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let ordering = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.sort_key().cmp(&r.sort_key()),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };

        match ordering {
            std::cmp::Ordering::Less => {
                if let Some(l) = left.next() {
                    kept_left.push(l);
                }
            }
            std::cmp::Ordering::Greater => {
                if let Some(r) = right.next() {
                    kept_right.push(r);
                }
            }
            std::cmp::Ordering::Equal => {
                let identical = matches!(
                    (left.peek(), right.peek()),
                    (Some(l), Some(r)) if l.hash == r.hash
                );

                match (left.next(), right.next()) {
                    (Some(l), Some(r)) if !identical => {
                        kept_left.push(l);
                        kept_right.push(r);
                    }
                    _ => (),
                }
            }
        }
    }

    (kept_left, kept_right)
}

/// Replace every frontier bucket at the given level with its children,
/// recording the expanded bucket itself as a difference.
async fn expand<Key, Value, Hash, Storage>(
    frontier: Vec<Frontier<Key, Value, Hash>>,
    level: u32,
    storage: &Storage,
    removed: bool,
    upper: &mut Vec<BucketDiff<Key, Hash>>,
) -> Result<Vec<Frontier<Key, Value, Hash>>, TidemarkProllyTreeError>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    let mut next = Vec::with_capacity(frontier.len());

    for mut entry in frontier {
        if entry.level != level {
            next.push(entry);
            continue;
        }

        entry.load(storage).await?;

        let Some(bucket) = entry.bucket.as_ref() else {
            continue;
        };

        let info = bucket_info(&entry.hash, bucket);

        upper.push(if removed {
            BucketDiff::Removed(info)
        } else {
            BucketDiff::Added(info)
        });

        for node in bucket.nodes() {
            next.push(Frontier::from_reference(level - 1, node.reference()?));
        }
    }

    Ok(next)
}

fn leaf_entries<Key, Value, Hash>(
    bucket: Bucket<Key, Value, Hash>,
) -> Result<Vec<Entry<Key, Value>>, TidemarkProllyTreeError>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    bucket
        .into_nodes()
        .into_iter()
        .map(|node| node.into_entry())
        .collect()
}

/// Merge two sorted entry runs into entry-level differences, eliding
/// tuples that carry the same value on both sides.
fn merge_entry_diffs<Key, Value>(
    left: Vec<Entry<Key, Value>>,
    right: Vec<Entry<Key, Value>>,
) -> Vec<EntryDiff<Key, Value>>
where
    Key: KeyType,
    Value: ValueType,
{
    let mut diffs = Vec::new();

    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let ordering = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.tuple.cmp(&r.tuple),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => break,
        };

        match ordering {
            std::cmp::Ordering::Less => {
                if let Some(l) = left.next() {
                    diffs.push(EntryDiff::Removed(l));
                }
            }
            std::cmp::Ordering::Greater => {
                if let Some(r) = right.next() {
                    diffs.push(EntryDiff::Added(r));
                }
            }
            std::cmp::Ordering::Equal => {
                if let (Some(l), Some(r)) = (left.next(), right.next())
                    && l.value != r.value
                {
                    diffs.push(EntryDiff::Updated {
                        tuple: l.tuple,
                        old: l.value,
                        new: r.value,
                    });
                }
            }
        }
    }

    diffs
}

/// Compute the structural difference between two trees sharing a block
/// store, yielded lazily as a stream of [`DiffStep`]s.
///
/// Subtrees with identical content addresses are pruned from the
/// comparison without ever being fetched, so the cost of a diff is
/// proportional to the difference between the trees rather than to
/// their size. Diffing a tree against itself fetches nothing and yields
/// nothing.
pub fn diff<'a, Key, Value, Hash, Storage>(
    storage: &'a Storage,
    left: &'a ProllyTree<Key, Value, Hash>,
    right: &'a ProllyTree<Key, Value, Hash>,
) -> impl Stream<Item = Result<DiffStep<Key, Value, Hash>, TidemarkProllyTreeError>> + 'a
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
    Storage: ContentAddressedStorage<Hash = Hash>,
{
    try_stream! {
        let mut left_frontier = vec![Frontier::from_root(left.root())];
        let mut right_frontier = vec![Frontier::from_root(right.root())];
        let mut upper: Vec<BucketDiff<Key, Hash>> = Vec::new();

        // Descend both frontiers level by level, always expanding the
        // highest level still present so same-level runs line up for
        // pruning
        loop {
            (left_frontier, right_frontier) = prune(left_frontier, right_frontier);

            let left_top = left_frontier.iter().map(|entry| entry.level).max();
            let right_top = right_frontier.iter().map(|entry| entry.level).max();

            let Some(top) = left_top.max(right_top) else {
                break;
            };

            if top == 0 {
                break;
            }

            if left_top == Some(top) {
                left_frontier = expand(left_frontier, top, storage, true, &mut upper).await?;
            }

            if right_top == Some(top) {
                right_frontier = expand(right_frontier, top, storage, false, &mut upper).await?;
            }
        }

        if !upper.is_empty() {
            yield DiffStep {
                entries: Vec::new(),
                buckets: std::mem::take(&mut upper),
            };
        }

        // Leaf phase: walk both remaining frontiers in tuple order,
        // grouping maximal runs of overlapping buckets into steps
        let mut left = left_frontier.into_iter().peekable();
        let mut right = right_frontier.into_iter().peekable();

        loop {
            enum Take {
                Left,
                Right,
                Both,
            }

            let take = match (left.peek(), right.peek()) {
                (None, None) => break,
                (Some(_), None) => Take::Left,
                (None, Some(_)) => Take::Right,
                (Some(l), Some(r)) => match (&l.tuple, &r.tuple) {
                    // An empty bucket overlaps nothing
                    (None, _) => Take::Left,
                    (_, None) => Take::Right,
                    _ => Take::Both,
                },
            };

            let mut removed: Vec<(Hash, Bucket<Key, Value, Hash>)> = Vec::new();
            let mut added: Vec<(Hash, Bucket<Key, Value, Hash>)> = Vec::new();

            match take {
                Take::Left => {
                    if let Some(mut entry) = left.next() {
                        entry.load(storage).await?;
                        if let Some(bucket) = entry.bucket {
                            removed.push((entry.hash, bucket));
                        }
                    }
                }
                Take::Right => {
                    if let Some(mut entry) = right.next() {
                        entry.load(storage).await?;
                        if let Some(bucket) = entry.bucket {
                            added.push((entry.hash, bucket));
                        }
                    }
                }
                Take::Both => {
                    // Seed the group with whichever side starts lower,
                    // then absorb buckets from either side for as long
                    // as they overlap the span collected so far
                    let mut span_end: Option<Tuple<Key>> = None;

                    loop {
                        let absorb_left = match (left.peek(), &span_end) {
                            (Some(l), None) => {
                                // First pick: the lower-starting side
                                match right.peek() {
                                    Some(r) => l.tuple <= r.tuple,
                                    None => true,
                                }
                            }
                            (Some(l), Some(end)) => l.tuple.as_ref() <= Some(end),
                            (None, _) => false,
                        };

                        let absorb_right = match (right.peek(), &span_end) {
                            (Some(_), None) => !absorb_left,
                            (Some(r), Some(end)) => r.tuple.as_ref() <= Some(end),
                            (None, _) => false,
                        };

                        if !absorb_left && !absorb_right {
                            break;
                        }

                        if absorb_left
                            && let Some(mut entry) = left.next()
                        {
                            entry.load(storage).await?;
                            if let Some(bucket) = entry.bucket {
                                span_end = span_end
                                    .into_iter()
                                    .chain(bucket.last_tuple().cloned())
                                    .max();
                                removed.push((entry.hash, bucket));
                            }
                        }

                        if absorb_right
                            && let Some(mut entry) = right.next()
                        {
                            entry.load(storage).await?;
                            if let Some(bucket) = entry.bucket {
                                span_end = span_end
                                    .into_iter()
                                    .chain(bucket.last_tuple().cloned())
                                    .max();
                                added.push((entry.hash, bucket));
                            }
                        }
                    }
                }
            }

            let mut buckets = Vec::with_capacity(removed.len() + added.len());
            let mut removed_entries = Vec::new();
            let mut added_entries = Vec::new();

            for (hash, bucket) in removed {
                buckets.push(BucketDiff::Removed(bucket_info(&hash, &bucket)));
                removed_entries.extend(leaf_entries(bucket)?);
            }

            for (hash, bucket) in added {
                buckets.push(BucketDiff::Added(bucket_info(&hash, &bucket)));
                added_entries.extend(leaf_entries(bucket)?);
            }

            yield DiffStep {
                entries: merge_entry_diffs(removed_entries, added_entries),
                buckets,
            };
        }
    }
}
