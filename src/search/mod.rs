//! Boolean tag/filename search language
//!
//! A query string goes through three stages:
//! 1. [`splitter`]: split into at most ten raw terms
//! 2. [`syntax`]: classify each term (operator, bracket or match term)
//! 3. [`compiler`]: build a predicate tree and render parameterized SQL
//!
//! ```no_run
//! use mediadex::{search, RecordStore};
//!
//! let store = RecordStore::for_library("/media").unwrap();
//! let ids = search::compile("t=holiday AND ( f~2023 OR -t~blurry )")
//!     .execute(&store, Some(50), 0)
//!     .unwrap();
//! ```

pub mod compiler;
pub mod splitter;
pub mod syntax;
pub mod unquote;

pub use compiler::{compile, compile_tokens, compile_with_max_terms, CompiledQuery, Predicate};
pub use splitter::{split, MAX_SEARCH_TERMS};
pub use syntax::{path_search, single_tag_search, MatchKind, Term, Token};
pub use unquote::unquote;
