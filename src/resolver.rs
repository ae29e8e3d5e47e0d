//! Stable content-derived identifiers for media files
//!
//! [`IdentityResolver::resolve`] maps a path plus its current stat to the
//! canonical [`MediaId`] for the file's content. Unchanged files are answered
//! from the store without hashing. Changed or unseen files are hashed and
//! reconciled against every other record carrying the same or the previous
//! hash:
//!
//! - identical content converges on one canonical id per hash
//! - an edited file that was the sole holder of its id keeps it
//! - a file that diverges from a still-present copy gets a new id
//! - content seen before gets its historical id back
//! - a new path whose content matches only vanished files takes over their id
//!   (a move), and a surviving copy takes over once every other holder is gone
//!
//! Hashing happens outside the write transaction. The transaction re-reads
//! the record and restarts the attempt if it changed in a way that needs a
//! hash nobody computed.

use std::path::Path;
use std::time::Duration;

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::hasher::{Blake3Hasher, ContentHasher};
use crate::models::{FileRecord, MediaId};
use crate::store::{RecordStore, WriteTxn};

/// Assigns stable identifiers to files
pub struct IdentityResolver<H: ContentHasher = Blake3Hasher> {
    store: RecordStore,
    hasher: H,
    max_retries: u32,
    retry_backoff: Duration,
}

impl IdentityResolver<Blake3Hasher> {
    /// Resolver using the default BLAKE3 hasher
    pub fn with_store(store: RecordStore) -> Self {
        Self::new(store, Blake3Hasher)
    }
}

impl<H: ContentHasher> IdentityResolver<H> {
    pub fn new(store: RecordStore, hasher: H) -> Self {
        let defaults = ResolverConfig::default();
        Self {
            store,
            hasher,
            max_retries: defaults.max_retries,
            retry_backoff: Duration::from_millis(defaults.retry_backoff_ms),
        }
    }

    /// Apply retry settings from config
    pub fn with_config(mut self, config: &ResolverConfig) -> Self {
        self.max_retries = config.max_retries;
        self.retry_backoff = Duration::from_millis(config.retry_backoff_ms);
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Stat `path` and resolve it
    pub fn resolve_file(&self, path: &Path) -> Result<MediaId> {
        let meta = std::fs::metadata(path).map_err(|source| Error::Hash {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = meta.modified().map_err(|source| Error::Hash {
            path: path.to_path_buf(),
            source,
        })?;
        let millis = chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis();
        self.resolve(path, meta.len(), millis)
    }

    /// Return the canonical identifier for `path` given its current stat
    ///
    /// Repeated calls with an unchanged stat never hash the file. Failing to
    /// read the file leaves the store untouched.
    pub fn resolve(&self, path: &Path, size: u64, modified: i64) -> Result<MediaId> {
        let path = std::path::absolute(path)?;
        let key = path
            .to_str()
            .ok_or_else(|| Error::InvalidPath(path.clone()))?
            .to_string();

        let mut hash: Option<String> = None;
        let mut attempt: u32 = 0;
        loop {
            if hash.is_none() {
                let needs_hash = match self.store.read_file(&key)? {
                    Some(old) => !old.is_up_to_date(size, modified),
                    None => true,
                };
                if needs_hash {
                    hash = Some(self.hash(&path)?);
                }
            }

            let outcome = self
                .store
                .write(|w| self.reconcile(w, &key, size, modified, hash.as_deref()));
            match outcome {
                Ok(Some(id)) => return Ok(id),
                Ok(None) => {
                    log::debug!("Record for {} changed before write, hashing", key);
                }
                Err(e) if e.is_busy() => {
                    log::debug!("Store busy resolving {}: {}", key, e);
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
            if attempt > self.max_retries {
                return Err(Error::Conflict { path, attempts: attempt });
            }
            std::thread::sleep(self.retry_backoff * attempt);
        }
    }

    fn hash(&self, path: &Path) -> Result<String> {
        log::trace!("Hashing {}", path.display());
        self.hasher.hash_file(path).map_err(|source| Error::Hash {
            path: path.to_path_buf(),
            source,
        })
    }

    /// One attempt inside the write transaction
    ///
    /// Returns `None` when the record needs a hash that was not computed.
    fn reconcile(
        &self,
        w: &WriteTxn<'_>,
        key: &str,
        size: u64,
        modified: i64,
        hash: Option<&str>,
    ) -> Result<Option<MediaId>> {
        let old = w.read_file(key)?;

        let record = match old {
            None => {
                let Some(hash) = hash else { return Ok(None) };
                self.insert_new(w, key, size, modified, hash)?
            }
            Some(old) if !old.is_up_to_date(size, modified) => {
                let Some(hash) = hash else { return Ok(None) };
                let updated = FileRecord {
                    path: key.to_string(),
                    size,
                    modified,
                    hash: hash.to_string(),
                    id: old.id.clone(),
                    missing: false,
                };
                self.apply_update(w, updated, &old)?
            }
            Some(old) => return self.revisit_unchanged(w, old).map(Some),
        };

        canonicalise(w, &record).map(Some)
    }

    fn insert_new(
        &self,
        w: &WriteTxn<'_>,
        key: &str,
        size: u64,
        modified: i64,
        hash: &str,
    ) -> Result<FileRecord> {
        // Reuse an id only when every other file with this content is gone
        let vanished: Vec<FileRecord> = w
            .files_with_hash(hash)?
            .into_iter()
            .filter(|r| !Path::new(&r.path).exists())
            .collect();

        let mut ids: Vec<&MediaId> = vanished.iter().map(|r| &r.id).collect();
        ids.sort();
        ids.dedup();

        let (id, moved_from) = match ids.as_slice() {
            [only] => ((*only).clone(), vanished.as_slice()),
            _ => (new_unused_id(w)?, &[][..]),
        };

        let record = FileRecord {
            path: key.to_string(),
            size,
            modified,
            hash: hash.to_string(),
            id,
            missing: false,
        };
        w.insert_file(&record)?;
        for stale in moved_from {
            w.remove_file(&stale.path)?;
        }

        log::info!("New [merged={}]: {}", moved_from.len(), key);
        Ok(record)
    }

    /// Store `updated` for a path previously recorded as `old`
    ///
    /// If the path had joined another id's group and every other member of
    /// that group is gone from disk, the path takes over the group's id. A
    /// path holding its group's id that diverges from a live copy gets a
    /// fresh id.
    fn apply_update(&self, w: &WriteTxn<'_>, mut updated: FileRecord, old: &FileRecord) -> Result<FileRecord> {
        let mut taken_over = Vec::new();

        if let Some(prev_canonical) = w.canonical_id_for_hash(&old.hash)? {
            let others: Vec<FileRecord> = w
                .files_with_hash(&old.hash)?
                .into_iter()
                .filter(|r| r.path != old.path)
                .collect();
            let shared = others.iter().any(|r| Path::new(&r.path).exists());

            if prev_canonical != old.id {
                if !shared {
                    updated.id = prev_canonical;
                    taken_over = others;
                }
            } else if shared && old.hash != updated.hash {
                // The live copies keep the id for the old content
                updated.id = new_unused_id(w)?;
            }
        }

        w.update_file(&updated)?;
        for stale in &taken_over {
            w.remove_file(&stale.path)?;
        }

        log::info!(
            "Updated [merged={} hash={}]: {}",
            taken_over.len(),
            if old.hash == updated.hash { "same" } else { "changed" },
            updated.path
        );
        Ok(updated)
    }

    fn revisit_unchanged(&self, w: &WriteTxn<'_>, old: FileRecord) -> Result<MediaId> {
        if old.missing {
            w.set_file_missing(&old.path, false)?;
        }

        let id = canonicalise(w, &old)?;

        // Become the canonical holder once all files holding that id are gone
        if id != old.id {
            let holders = w.paths_with_id(&id)?;
            if holders.iter().all(|p| !Path::new(p).exists()) {
                self.apply_update(w, old.clone(), &old)?;
            }
        }

        Ok(id)
    }
}

/// Canonical id for the record's hash, installing the record's own id if none
fn canonicalise(w: &WriteTxn<'_>, record: &FileRecord) -> Result<MediaId> {
    if let Some(id) = w.canonical_id_for_hash(&record.hash)? {
        return Ok(id);
    }
    w.store_canonical_id(&record.hash, &record.id)?;
    Ok(record.id.clone())
}

fn new_unused_id(w: &WriteTxn<'_>) -> Result<MediaId> {
    loop {
        let id = MediaId::random();
        if !w.id_has_hashes(&id)? {
            return Ok(id);
        }
        log::warn!("Discarding colliding random id: {}", id);
    }
}
