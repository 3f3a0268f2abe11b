#![warn(missing_docs)]

//! Content-addressed block storage for Tidemark trees.
//!
//! This crate provides the storage collaborator that the tree engine in
//! `tidemark-prolly-tree` is written against: an [Encoder] that turns a
//! block into canonical bytes plus a digest, a [BlockStore] that stores
//! and retrieves those bytes by address, and a [Storage] envelope that
//! combines the two into a [ContentAddressedStorage].
//!
//! ```rust
//! use tidemark_storage::{Storage, CborEncoder, MemoryBlockStore, Blake3Hash};
//!
//! let storage = Storage {
//!     encoder: CborEncoder,
//!     backend: MemoryBlockStore::<Blake3Hash, Vec<u8>>::default(),
//! };
//! ```
//!
//! The prepared `storage` automatically implements [ContentAddressedStorage]
//! for bounds-matching encoders and block stores.

mod encoder;
pub use encoder::*;

mod error;
pub use error::*;

mod store;
pub use store::*;

mod hash;
pub use hash::*;
