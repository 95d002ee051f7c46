//! Outcome of classifying a filename against the reference catalog.

use super::catalog::UNKNOWN_IDENTITY;
use serde::Serialize;
use std::fmt;

/// Either a catalog identity or the `Unknown` sentinel.
///
/// Callers have to handle both arms; there is no "empty name" state.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "identity", rename_all = "snake_case")]
pub enum MatchResult {
    MatchedName(String),
    Unknown,
}

impl MatchResult {
    /// Folder segment used for this result in destination keys.
    pub fn folder_name(&self) -> &str {
        match self {
            MatchResult::MatchedName(name) => name,
            MatchResult::Unknown => UNKNOWN_IDENTITY,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}
