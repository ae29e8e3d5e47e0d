//! Content digests for identity resolution

use std::fs::File;
use std::io;
use std::path::Path;

/// Computes a strong digest of a file's bytes
///
/// Implementations must be deterministic: identical bytes produce identical
/// digests. The resolver only calls this when a path's stat changed.
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> io::Result<String>;
}

/// Streaming BLAKE3, hex encoded
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(&mut file)?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}
