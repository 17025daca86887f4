//! Sources are compared by blake3 digest, not mtime: an editor that rewrites
//! a file with identical bytes must not restart anything.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Digest of a module that is imported but has no source.
    pub const PLACEHOLDER: Self = Self([0; 32]);

    pub fn is_placeholder(&self) -> bool {
        *self == Self::PLACEHOLDER
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

/// Short form for log lines.
impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

pub fn hash_bytes(data: impl AsRef<[u8]>) -> ContentHash {
    ContentHash(blake3::hash(data.as_ref()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_hash() {
        assert_eq!(hash_bytes("fn startup() {}"), hash_bytes("fn startup() {}"));
        assert_ne!(hash_bytes("fn startup() {}"), hash_bytes("fn startup() { 1 }"));
    }

    #[test]
    fn placeholder_differs_from_empty_source() {
        assert!(ContentHash::PLACEHOLDER.is_placeholder());
        assert!(!hash_bytes("").is_placeholder());
    }

    #[test]
    fn display_is_hex_prefix() {
        let hash = hash_bytes("x");
        assert_eq!(hash.to_string().len(), 16);
        assert!(hash.to_hex().starts_with(&hash.to_string()));
    }
}
