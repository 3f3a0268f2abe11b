#![warn(missing_docs)]

//! Shared primitives used across the Tidemark workspace.
//!
//! At the moment this is limited to the cross-target bound compatibility
//! traits that let async traits compile for both native targets (where
//! implementers cross threads) and `wasm32-unknown-unknown` (where they
//! do not).

mod sync;
pub use sync::*;
