//! Destination key construction: `{processed_root}/{identity}/{filename}`.

use crate::{errors::ProcessingError, models::match_result::MatchResult};

/// Last `/`-separated segment of a key; `None` for empty keys and
/// directory markers (`input/`).
pub fn filename_of(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().unwrap_or(key);
    (!name.is_empty()).then_some(name)
}

/// Build the destination key for `source_key`.
///
/// Depends only on the filename, the match result and the processed root, so
/// the same file under a different input prefix lands in the same place.
pub fn build_destination(
    source_key: &str,
    matched: &MatchResult,
    processed_root: &str,
) -> Result<String, ProcessingError> {
    let filename =
        filename_of(source_key).ok_or_else(|| ProcessingError::InvalidKey(source_key.to_string()))?;
    let root = processed_root.trim_matches('/');
    if root.is_empty() {
        return Err(ProcessingError::InvalidKey(source_key.to_string()));
    }
    Ok(format!("{}/{}/{}", root, matched.folder_name(), filename))
}
