//! Build-time schema fingerprint for the record store
//!
//! Hashes the source files that define the on-disk layout of `media.db`.
//! The store writes this fingerprint into its `meta` table when it creates
//! the database and warns when an existing database carries a different one.
//!
//! ## Schema-critical files:
//! - src/store.rs: SQLite table definitions (files, hashes, tags, meta)
//! - src/models.rs: Column-backed types (FileRecord, Tag, sort columns)

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const SCHEMA_CRITICAL_FILES: &[&str] = &["src/store.rs", "src/models.rs"];

fn main() {
    let schema_hash = compute_schema_hash();

    println!("cargo:rustc-env=STORE_SCHEMA_HASH={}", schema_hash);

    for file in SCHEMA_CRITICAL_FILES {
        println!("cargo:rerun-if-changed={}", file);
    }
}

/// Compute a deterministic hash of all schema-critical source files
fn compute_schema_hash() -> String {
    let mut hasher = blake3::Hasher::new();

    // Sorted so the fingerprint does not depend on list order
    let files: BTreeSet<&str> = SCHEMA_CRITICAL_FILES.iter().copied().collect();

    for file_path in &files {
        let content = fs::read(Path::new(file_path))
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", file_path, e));

        hasher.update(file_path.as_bytes());
        hasher.update(&content);
    }

    // 64 bits is plenty for a compatibility check
    hasher.finalize().as_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}
