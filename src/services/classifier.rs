//! Object classification: matcher + path builder, no storage access.

use super::{
    name_matcher::NameMatcher,
    path_builder::{build_destination, filename_of},
};
use crate::{errors::ProcessingError, models::match_result::MatchResult};
use serde::Serialize;

/// Where a source object should go and why.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub source_key: String,
    pub destination_key: String,
    pub matched: MatchResult,
}

#[derive(Debug, Clone)]
pub struct ObjectClassifier {
    matcher: NameMatcher,
    processed_root: String,
}

impl ObjectClassifier {
    pub fn new(matcher: NameMatcher, processed_root: impl Into<String>) -> Self {
        Self {
            matcher,
            processed_root: processed_root.into().trim_matches('/').to_string(),
        }
    }

    pub fn processed_root(&self) -> &str {
        &self.processed_root
    }

    /// Classify a source key by its filename and compute its destination.
    pub fn classify_and_route(&self, source_key: &str) -> Result<Route, ProcessingError> {
        let filename = filename_of(source_key)
            .ok_or_else(|| ProcessingError::InvalidKey(source_key.to_string()))?;
        let matched = self.matcher.match_filename(filename);
        let destination_key = build_destination(source_key, &matched, &self.processed_root)?;
        Ok(Route {
            source_key: source_key.to_string(),
            destination_key,
            matched,
        })
    }

    /// True for keys inside the processed tree, which are outputs, never inputs.
    pub fn is_processed_key(&self, key: &str) -> bool {
        key.strip_prefix(self.processed_root.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}
