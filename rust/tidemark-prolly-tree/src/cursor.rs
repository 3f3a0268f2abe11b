use tidemark_storage::{ContentAddressedStorage, HashType};

use crate::{
    AddressedBucket, KeyType, Node, ProllyTree, TidemarkProllyTreeError, Tuple, ValueType,
};

/// A tree deeper than this has degenerated far beyond anything the
/// chunker can produce; treated as corruption rather than traversed.
const MAX_DEPTH: usize = 4096;

#[derive(Clone, Debug)]
struct Position<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    bucket: AddressedBucket<Key, Value, Hash>,
    index: usize,
}

/// A forward-only traversal over the buckets of a [`ProllyTree`].
///
/// The cursor maintains the path of buckets from the root down to its
/// current position and fetches buckets lazily, so sweeping a narrow
/// tuple range only ever loads the spine above that range. Seek targets
/// must be non-decreasing; seeking behind the current position fails
/// with [`TidemarkProllyTreeError::OutOfOrderSeek`].
///
/// The cursor holds no reference to the block store; each fetching
/// operation borrows one for its own duration.
pub struct Cursor<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    path: Vec<Position<Key, Value, Hash>>,
    started: bool,
    done: bool,
}

impl<Key, Value, Hash> Cursor<Key, Value, Hash>
where
    Key: KeyType,
    Value: ValueType,
    Hash: HashType,
{
    /// Construct a [`Cursor`] positioned (but not yet started) at the
    /// root of the given tree
    pub fn new(tree: &ProllyTree<Key, Value, Hash>) -> Self {
        let root = tree.root().clone();
        let done = root.bucket().is_empty();

        Self {
            path: vec![Position {
                bucket: root,
                index: 0,
            }],
            started: false,
            done,
        }
    }

    /// Whether this cursor has moved past the last node it will visit
    pub fn done(&self) -> bool {
        self.done
    }

    /// The level of the bucket the cursor currently rests in
    pub fn level(&self) -> u32 {
        match self.path.last() {
            Some(position) => position.bucket.bucket().level(),
            None => 0,
        }
    }

    /// The node at the current position
    pub fn current(&self) -> Result<&Node<Key, Value, Hash>, TidemarkProllyTreeError> {
        let position = self.position()?;

        position
            .bucket
            .bucket()
            .nodes()
            .get(position.index)
            .ok_or_else(|| {
                TidemarkProllyTreeError::InvalidState("Cursor index out of bounds".into())
            })
    }

    /// The bucket the cursor currently rests in
    pub fn current_bucket(
        &self,
    ) -> Result<&AddressedBucket<Key, Value, Hash>, TidemarkProllyTreeError> {
        Ok(&self.position()?.bucket)
    }

    fn position(&self) -> Result<&Position<Key, Value, Hash>, TidemarkProllyTreeError> {
        if !self.started {
            return Err(TidemarkProllyTreeError::InvalidState(
                "Cursor has not been positioned yet".into(),
            ));
        }

        if self.done {
            return Err(TidemarkProllyTreeError::InvalidState(
                "Cursor is exhausted".into(),
            ));
        }

        self.path.last().ok_or_else(|| {
            TidemarkProllyTreeError::InvalidState("Cursor has an empty path".into())
        })
    }

    fn current_tuple(&self) -> Option<&Tuple<Key>> {
        let position = self.path.last()?;
        position
            .bucket
            .bucket()
            .nodes()
            .get(position.index)
            .map(|node| node.tuple())
    }

    fn guard_forward_motion(
        &self,
        target: &Tuple<Key>,
    ) -> Result<(), TidemarkProllyTreeError> {
        if self.started
            && !self.done
            && let Some(current) = self.current_tuple()
            && target < current
        {
            return Err(TidemarkProllyTreeError::OutOfOrderSeek(format!(
                "Cursor at {current} asked to seek back to {target}"
            )));
        }

        Ok(())
    }

    /// Position the cursor at the first node at `level` whose tuple is
    /// greater than or equal to the target, exhausting the cursor when
    /// no such node remains.
    pub async fn next_tuple<Storage>(
        &mut self,
        storage: &Storage,
        target: &Tuple<Key>,
        level: u32,
    ) -> Result<(), TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        self.guard_forward_motion(target)?;

        if self.done {
            self.started = true;
            return Ok(());
        }

        self.started = true;

        if !self.realign(target, level)? {
            return Ok(());
        }

        self.descend(storage, target, level).await?;

        // Land on the first node at or after the target, spilling into
        // the next bucket when this one ends below it
        if let Some(position) = self.path.last_mut() {
            let index = position.bucket.bucket().find_tuple_index(target);

            if index < position.bucket.bucket().len() {
                position.index = index.max(position.index);
                return Ok(());
            }
        }

        self.advance_bucket(storage).await?;

        Ok(())
    }

    /// Position the cursor at the node at `level` whose domain covers
    /// the target: the last node at or below it, clamped to the first
    /// node of the tree when the target sorts before everything.
    ///
    /// Unlike [`Cursor::next_tuple`], this never exhausts the cursor on
    /// a non-empty tree.
    pub async fn seek_domain<Storage>(
        &mut self,
        storage: &Storage,
        target: &Tuple<Key>,
        level: u32,
    ) -> Result<(), TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        self.guard_forward_motion(target)?;

        if self.done {
            self.started = true;
            return Ok(());
        }

        self.started = true;

        if !self.realign(target, level)? {
            return Ok(());
        }

        self.descend(storage, target, level).await?;

        if let Some(position) = self.path.last_mut() {
            let index = position.bucket.bucket().find_domain_index(target);
            position.index = index.max(position.index);
        }

        Ok(())
    }

    /// Ascend out of any subtree that cannot contain the target, and out
    /// of any bucket below the requested level. Returns `false` when the
    /// requested level does not exist in this tree, exhausting the
    /// cursor.
    fn realign(
        &mut self,
        target: &Tuple<Key>,
        level: u32,
    ) -> Result<bool, TidemarkProllyTreeError> {
        // Climb out to the shallowest ancestor whose following sibling
        // subtree starts at or below the target: everything beneath that
        // ancestor's current child sorts before the sibling, so the
        // target cannot be found there. An ancestor resting on its last
        // child says nothing either way; the scan continues past it to
        // the ancestors above.
        for depth in 0..self.path.len().saturating_sub(1) {
            let position = &self.path[depth];
            let next_sibling = position.bucket.bucket().nodes().get(position.index + 1);

            if let Some(node) = next_sibling
                && node.tuple() <= target
            {
                self.path.truncate(depth + 1);
                break;
            }
        }

        // Climb out of any bucket below the requested level
        while self.level() < level && self.path.len() > 1 {
            self.path.pop();
        }

        if self.level() < level {
            self.done = true;
            return Ok(false);
        }

        Ok(true)
    }

    /// Descend along domain indices until the cursor rests in a bucket
    /// at the requested level
    async fn descend<Storage>(
        &mut self,
        storage: &Storage,
        target: &Tuple<Key>,
        level: u32,
    ) -> Result<(), TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        while self.level() > level {
            if self.path.len() > MAX_DEPTH {
                return Err(TidemarkProllyTreeError::UnexpectedShape(
                    "Tree exceeds the maximum supported depth".into(),
                ));
            }

            let child = {
                let position = self.path.last_mut().ok_or_else(|| {
                    TidemarkProllyTreeError::InvalidState("Cursor has an empty path".into())
                })?;
                let index = position.bucket.bucket().find_domain_index(target);

                // Forward-only: never step back past a subtree we have
                // already traversed
                position.index = index.max(position.index);

                let node = position
                    .bucket
                    .bucket()
                    .nodes()
                    .get(position.index)
                    .ok_or_else(|| {
                        TidemarkProllyTreeError::InvalidState(
                            "Cursor index out of bounds".into(),
                        )
                    })?;

                node.reference()?.hash().clone()
            };

            let bucket = AddressedBucket::fetch(&child, storage).await?;

            self.path.push(Position { bucket, index: 0 });
        }

        Ok(())
    }

    /// Step to the next node at the current level, crossing into the
    /// following bucket when the current one ends
    pub async fn advance<Storage>(
        &mut self,
        storage: &Storage,
    ) -> Result<(), TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        if self.done {
            return Err(TidemarkProllyTreeError::InvalidState(
                "Cannot advance an exhausted cursor".into(),
            ));
        }

        if let Some(position) = self.path.last_mut()
            && position.index + 1 < position.bucket.bucket().len()
        {
            position.index += 1;
            return Ok(());
        }

        self.advance_bucket(storage).await?;

        Ok(())
    }

    /// Move to the first node of the next bucket at the current level,
    /// exhausting the cursor when none remains. Returns whether a next
    /// bucket was found.
    pub async fn advance_bucket<Storage>(
        &mut self,
        storage: &Storage,
    ) -> Result<bool, TidemarkProllyTreeError>
    where
        Storage: ContentAddressedStorage<Hash = Hash>,
    {
        if self.done {
            return Ok(false);
        }

        let level = self.level();

        while self.path.len() > 1 {
            let parent = &self.path[self.path.len() - 2];

            if parent.index + 1 < parent.bucket.bucket().len() {
                self.path.truncate(self.path.len() - 1);

                if let Some(position) = self.path.last_mut() {
                    position.index += 1;
                }

                // Descend along first children back down to the level we
                // were traversing
                while self.level() > level {
                    if self.path.len() > MAX_DEPTH {
                        return Err(TidemarkProllyTreeError::UnexpectedShape(
                            "Tree exceeds the maximum supported depth".into(),
                        ));
                    }

                    let child = {
                        let position = self.path.last().ok_or_else(|| {
                            TidemarkProllyTreeError::InvalidState(
                                "Cursor has an empty path".into(),
                            )
                        })?;
                        let node = position
                            .bucket
                            .bucket()
                            .nodes()
                            .get(position.index)
                            .ok_or_else(|| {
                                TidemarkProllyTreeError::InvalidState(
                                    "Cursor index out of bounds".into(),
                                )
                            })?;

                        node.reference()?.hash().clone()
                    };

                    let bucket = AddressedBucket::fetch(&child, storage).await?;

                    self.path.push(Position { bucket, index: 0 });
                }

                return Ok(true);
            }

            self.path.pop();
        }

        self.done = true;

        Ok(false)
    }
}
