#![warn(missing_docs)]

//! A probabilistically balanced, persistent search tree - a "prolly"
//! tree - over content-addressed storage.
//!
//! Entries are sorted by a composite [`Tuple`] and packed into
//! [`Bucket`]s whose boundaries are decided by a deterministic
//! [`Boundary`] strategy, so the shape of a tree is a pure function of
//! its contents: two trees holding the same entries share the same root
//! address no matter what sequence of [`mutate`] calls produced them.
//! That makes root addresses cheap to compare and makes [`diff`]
//! proportional to the difference between two trees rather than to
//! their size.
//!
//! ```rust,no_run
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! use tidemark_prolly_tree::{Change, Entry, HashBoundary, ProllyTree, Tuple, mutate};
//! use tidemark_storage::{Blake3Hash, CborEncoder, MemoryBlockStore, Storage};
//!
//! let mut storage = Storage {
//!     encoder: CborEncoder,
//!     backend: MemoryBlockStore::<Blake3Hash, Vec<u8>>::default(),
//! };
//!
//! let tree = ProllyTree::<Vec<u8>, Vec<u8>, Blake3Hash>::empty(32, &mut storage).await?;
//! let entry = Entry::new(Tuple::new(0, b"key".to_vec()), b"value".to_vec());
//!
//! let tree = mutate::<HashBoundary, _, _, _, _>(
//!     &mut storage,
//!     &tree,
//!     vec![vec![Change::Put(entry)]],
//! )
//! .await?;
//!
//! println!("{:?}", tree.hash());
//! # Ok(())
//! # }
//! ```

mod boundary;
mod bucket;
mod cursor;
mod diff;
mod entry;
mod error;
mod key;
mod kv;
mod mutation;
mod node;
mod reference;
mod search;
mod tree;
mod tuple;

pub use boundary::*;
pub use bucket::*;
pub use cursor::*;
pub use diff::*;
pub use entry::*;
pub use error::*;
pub use key::*;
pub use kv::*;
pub use mutation::*;
pub use node::*;
pub use reference::*;
pub use search::*;
pub use tree::*;
pub use tuple::*;
