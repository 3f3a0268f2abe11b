use crate::KeyType;

/// The highest level at which boundary decisions remain distinct; any
/// level above this hashes identically to it, which caps the effective
/// height of the tree.
pub const MAX_LEVEL: u32 = 32;

/// The smallest meaningful average bucket size; anything lower is
/// clamped so the boundary probability stays below one.
const MIN_AVERAGE: u32 = 2;

/// A chunking strategy: decides, for a node at some level, whether that
/// node closes the bucket being accumulated.
///
/// The decision must be a pure function of `(average, level, key)` so
/// that two trees holding the same entries always chunk identically, no
/// matter the order of the mutations that produced them. The strategy is
/// part of the persisted format: reading a tree with a different
/// strategy than the one that wrote it produces undefined shapes.
pub trait Boundary<Key>
where
    Key: KeyType,
{
    /// Whether a node with the given key closes its bucket
    fn is_boundary(average: u32, level: u32, key: &Key) -> bool;
}

/// The default [`Boundary`]: hashes the level and the key bytes with
/// BLAKE3 and closes a bucket when the leading 32 bits of the digest
/// fall below `u32::MAX / average`, yielding geometrically distributed
/// bucket sizes with the configured mean.
pub struct HashBoundary;

impl<Key> Boundary<Key> for HashBoundary
where
    Key: KeyType,
{
    fn is_boundary(average: u32, level: u32, key: &Key) -> bool {
        let average = average.max(MIN_AVERAGE);
        let level = level.min(MAX_LEVEL);

        let mut hasher = blake3::Hasher::new();
        hasher.update(&level.to_le_bytes());
        hasher.update(key.bytes());
        let digest = *hasher.finalize().as_bytes();

        let probe = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

        probe < u32::MAX / average
    }
}
