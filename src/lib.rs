//! Mediadex: stable identifiers and tag search for a personal media library
//!
//! Mediadex keeps a small SQLite store in `.mediadex/` next to a media
//! library. Every file is mapped to an identifier derived from its content,
//! which survives renames, moves and edits, and every identifier can carry
//! tags that a boolean query language searches together with file paths.
//!
//! # Architecture
//!
//! - **Resolver**: hashes files and reconciles them into canonical ids
//! - **Store**: SQLite tables for files, hash -> id, tags
//! - **Search**: splits, classifies and compiles queries into SQL
//! - **Cleaner**: flags files that disappeared from disk
//!
//! # Example Usage
//!
//! ```no_run
//! use mediadex::{search, IdentityResolver, RecordStore};
//!
//! let store = RecordStore::for_library("/media").unwrap();
//! let resolver = IdentityResolver::with_store(store.clone());
//! let id = resolver.resolve_file("/media/cat.jpg".as_ref()).unwrap();
//! store.add_tag(&id, "cat", 1).unwrap();
//!
//! let hits = search::compile("t=cat").execute(&store, None, 0).unwrap();
//! assert_eq!(hits, vec![id]);
//! ```

pub mod cleaner;
pub mod cli;
pub mod config;
pub mod error;
pub mod hasher;
pub mod models;
pub mod output;
pub mod resolver;
pub mod search;
pub mod store;

// Re-export commonly used types
pub use cleaner::Cleaner;
pub use config::Config;
pub use error::{Error, Result};
pub use hasher::{Blake3Hasher, ContentHasher};
pub use models::{FileRecord, MediaId, SortColumn, SortDirection, SortOrder, Tag, TagFrequency};
pub use resolver::IdentityResolver;
pub use search::CompiledQuery;
pub use store::{RecordStore, StoreStats};
