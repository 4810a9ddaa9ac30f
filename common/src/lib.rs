//! Wire-level types shared by the engine and the runtime.
//!
//! Nothing in this crate performs cryptography, networking, or storage;
//! those are external collaborators (see `tallychain-runtime::services`).
//! This crate only fixes the *shape* of the data those collaborators
//! exchange: heights, rounds, public keys, block/transaction hashes, and
//! the block itself.

mod hash;
mod signature;
mod types;

pub use hash::*;
pub use signature::Signature;
pub use types::*;
