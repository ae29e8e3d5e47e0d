//! Missing-file maintenance
//!
//! Records are never dropped when a file disappears; they are flagged
//! `missing` so search skips them while the resolver can still use them to
//! recognise a move.

use std::path::Path;

use crate::error::{Error, Result};
use crate::store::RecordStore;

pub struct Cleaner<'s> {
    store: &'s RecordStore,
}

impl<'s> Cleaner<'s> {
    pub fn new(store: &'s RecordStore) -> Self {
        Self { store }
    }

    /// Flag every live record whose file no longer exists
    ///
    /// Returns how many records were flagged.
    pub fn mark_missing_files(&self) -> Result<usize> {
        let gone: Vec<String> = self
            .store
            .live_paths()?
            .into_iter()
            .filter(|p| !Path::new(p).exists())
            .collect();

        if gone.is_empty() {
            log::debug!("No missing files");
            return Ok(0);
        }

        let marked = self.store.write(|w| {
            let mut n = 0;
            for path in &gone {
                if w.set_file_missing(path, true)? {
                    n += 1;
                }
            }
            Ok(n)
        })?;

        log::info!("Marked {} missing files", marked);
        Ok(marked)
    }

    /// Flag one path as gone
    ///
    /// Best effort: the record may already have been merged into another
    /// path, in which case nothing changes.
    pub fn file_gone(&self, path: &Path) -> Result<bool> {
        let path = std::path::absolute(path)?;
        let key = path.to_str().ok_or_else(|| Error::InvalidPath(path.clone()))?;
        let changed = self.store.write(|w| w.set_file_missing(key, true))?;
        log::debug!("File gone {} (changed={})", key, changed);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::IdentityResolver;
    use tempfile::TempDir;

    #[test]
    fn test_mark_missing_files() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.jpg");
        let b = temp.path().join("b.jpg");
        std::fs::write(&a, b"aaa").unwrap();
        std::fs::write(&b, b"bbbb").unwrap();

        let store = RecordStore::for_library(temp.path()).unwrap();
        let resolver = IdentityResolver::with_store(store.clone());
        resolver.resolve(&a, 3, 1).unwrap();
        resolver.resolve(&b, 4, 1).unwrap();

        std::fs::remove_file(&a).unwrap();

        let cleaner = Cleaner::new(&store);
        assert_eq!(cleaner.mark_missing_files().unwrap(), 1);
        assert_eq!(cleaner.mark_missing_files().unwrap(), 0);
        assert!(store.read_file(a.to_str().unwrap()).unwrap().unwrap().missing);
        assert!(!store.read_file(b.to_str().unwrap()).unwrap().unwrap().missing);
    }

    #[test]
    fn test_file_gone_then_resolved_again() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.jpg");
        std::fs::write(&a, b"aaa").unwrap();

        let store = RecordStore::for_library(temp.path()).unwrap();
        let resolver = IdentityResolver::with_store(store.clone());
        let id = resolver.resolve(&a, 3, 1).unwrap();

        assert!(Cleaner::new(&store).file_gone(&a).unwrap());
        assert!(store.read_file(a.to_str().unwrap()).unwrap().unwrap().missing);

        assert_eq!(resolver.resolve(&a, 3, 1).unwrap(), id);
        assert!(!store.read_file(a.to_str().unwrap()).unwrap().unwrap().missing);
    }

    #[test]
    fn test_file_gone_unknown_path() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::for_library(temp.path()).unwrap();
        assert!(!Cleaner::new(&store).file_gone(&temp.path().join("x")).unwrap());
    }
}
