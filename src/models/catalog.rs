//! The reference catalog of known character names.
//!
//! The catalog is a data asset: an ordered list of names loaded once at
//! startup. Order matters, because the matcher breaks every tie by catalog
//! position, so it is preserved exactly as written in the source file.

use std::{collections::HashSet, fs, path::Path};
use thiserror::Error;

/// Built-in Generation I catalog, used unless a catalog path is configured.
const BUILTIN_CATALOG: &str = include_str!("../../assets/gen1_catalog.txt");

/// Folder name used for objects whose filename matched nothing.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog contains no names")]
    Empty,
    #[error("catalog name `{0}` appears more than once")]
    Duplicate(String),
    #[error("catalog name `{0}` has no letters to match on")]
    Unmatchable(String),
    #[error("catalog name `{0}` cannot be used as a folder name")]
    InvalidName(String),
    #[error("failed to read catalog `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One catalog name plus the precomputed forms the matcher compares against.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Canonical name as written in the catalog, e.g. `Mr. Mime`.
    pub name: String,
    /// Normalized form, e.g. `mr mime`.
    pub normalized: String,
    /// Normalized form without separators, e.g. `mrmime`.
    pub compact: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::parse(BUILTIN_CATALOG)
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse a catalog: one name per line, blank lines and `#` comments ignored.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for line in text.lines() {
            let name = line.trim();
            if name.is_empty() || name.starts_with('#') {
                continue;
            }
            if name.contains('/') || name.eq_ignore_ascii_case(UNKNOWN_IDENTITY) {
                return Err(CatalogError::InvalidName(name.to_string()));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(CatalogError::Duplicate(name.to_string()));
            }

            let normalized = normalize(name);
            if normalized.is_empty() {
                return Err(CatalogError::Unmatchable(name.to_string()));
            }
            let compact = normalized.replace(' ', "");
            entries.push(CatalogEntry {
                name: name.to_string(),
                normalized,
                compact,
            });
        }

        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Lower-case `text` and collapse every run of non-letters into one space.
///
/// Digits, punctuation, symbols and separators (`_`, `-`, `.`, spaces) all
/// count as separators.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_separator = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if pending_separator && !out.is_empty() {
                out.push(' ');
            }
            pending_separator = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}
