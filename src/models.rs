//! Core data models for mediadex
//!
//! These are the rows the record store persists and the values the resolver
//! and search engine hand back to callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};

/// Stable identifier for one logical media item
///
/// Opaque to callers. Allocated as a random UUID the first time unseen
/// content is resolved and never reissued for different content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    /// Allocate a fresh random identifier
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MediaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MediaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last known state of one file path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path, unique key
    pub path: String,
    /// Size in bytes at last resolution
    pub size: u64,
    /// Modification time in milliseconds since the epoch
    pub modified: i64,
    /// Hex content digest
    pub hash: String,
    /// Identifier this path was assigned (may differ from the canonical one)
    pub id: MediaId,
    /// Set by the cleaner when the file vanished from disk
    pub missing: bool,
}

impl FileRecord {
    /// Whether the stored stat still matches the caller's view of the file
    pub fn is_up_to_date(&self, size: u64, modified: i64) -> bool {
        self.size == size && self.modified == modified
    }
}

/// A tag attached to a media identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
    /// Milliseconds since the epoch of the last add or delete
    pub modified: i64,
    pub deleted: bool,
}

/// How many search results carry a given tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFrequency {
    pub tag: String,
    pub count: u64,
}

/// Column a search can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum SortColumn {
    /// Path, compared case-insensitively
    File,
    FileSize,
    Modified,
}

impl SortColumn {
    fn sql(self) -> &'static str {
        match self {
            SortColumn::File => "f.path COLLATE NOCASE",
            SortColumn::FileSize => "f.size",
            SortColumn::Modified => "f.modified",
        }
    }

    pub fn asc(self) -> SortOrder {
        SortOrder { column: self, direction: SortDirection::Asc }
    }

    pub fn desc(self) -> SortOrder {
        SortOrder { column: self, direction: SortDirection::Desc }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One `ORDER BY` term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortOrder {
    /// Pair up parallel column and direction lists
    ///
    /// Both lists must be non-empty and of equal length.
    pub fn zip(columns: &[SortColumn], directions: &[SortDirection]) -> Result<Vec<SortOrder>> {
        if columns.is_empty() || directions.is_empty() {
            return Err(Error::invalid_sort("sort needs both columns and directions"));
        }
        if columns.len() != directions.len() {
            return Err(Error::invalid_sort(format!(
                "{} sort columns but {} directions",
                columns.len(),
                directions.len()
            )));
        }
        Ok(columns
            .iter()
            .zip(directions)
            .map(|(&column, &direction)| SortOrder { column, direction })
            .collect())
    }

    pub(crate) fn to_sql(self) -> String {
        let dir = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!("{} {}", self.column.sql(), dir)
    }
}
