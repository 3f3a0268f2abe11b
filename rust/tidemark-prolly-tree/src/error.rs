use thiserror::Error;
use tidemark_storage::TidemarkStorageError;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum TidemarkProllyTreeError {
    /// A caller supplied tuples or batches that violate the required
    /// strict ordering, or that contain duplicates. Raised before the
    /// block store or the tree are touched.
    #[error("Unsorted input: {0}")]
    UnsortedInput(String),

    /// A cursor was asked to seek behind its current position. Cursors
    /// are forward-only; this indicates a programming error in the
    /// calling algorithm and is fatal to the current traversal.
    #[error("Out of order seek: {0}")]
    OutOfOrderSeek(String),

    /// The block store is missing an address the tree structure claims
    /// exists. Indicates store corruption or inconsistent replication;
    /// never silently skipped.
    #[error("Bucket not found in storage: {0}")]
    BucketNotFound(String),

    /// API misuse, such as reading a cursor position before the cursor
    /// has been positioned.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// There was a problem when accessing storage
    #[error("Storage error: {0}")]
    Storage(#[from] TidemarkStorageError),

    /// The tree did not match the expected shape
    #[error("Tree did not match expected shape: {0}")]
    UnexpectedShape(String),
}
