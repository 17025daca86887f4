//! Change detection for module and app sources.

mod hash;

pub use hash::{ContentHash, hash_bytes};
