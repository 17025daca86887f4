//! Paths as the graph sees them.
//!
//! Watcher events, discovered files and configured roots must compare equal,
//! so every path entering the graph goes through [`normalize_path`].

pub mod fs;

pub use fs::{normalize_path, resolve_against};
