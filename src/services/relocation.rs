//! Reactive handling of a single newly observed source object.
//!
//! Validate → classify → overwrite the destination. Exactly one write per
//! successful call, none on failure, no internal retries. The same source
//! always produces the same destination key and content.

use super::{
    classifier::{ObjectClassifier, Route},
    image_check::validate_image,
    object_store::ObjectStore,
};
use crate::{errors::ProcessingError, models::match_result::MatchResult};
use bytes::Bytes;
use image::ImageFormat;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A completed relocation.
#[derive(Serialize, Debug, Clone)]
pub struct Relocation {
    pub source_key: String,
    pub destination_key: String,
    pub matched: MatchResult,
    pub content_type: String,
    pub size_bytes: usize,
}

#[derive(Clone)]
pub struct RelocationService {
    store: Arc<dyn ObjectStore>,
    classifier: Arc<ObjectClassifier>,
}

impl RelocationService {
    pub fn new(store: Arc<dyn ObjectStore>, classifier: Arc<ObjectClassifier>) -> Self {
        Self { store, classifier }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn classifier(&self) -> &ObjectClassifier {
        &self.classifier
    }

    /// Process one source object delivered with its content.
    pub async fn handle_new_object(
        &self,
        key: &str,
        content: Bytes,
    ) -> Result<Relocation, ProcessingError> {
        let result = async {
            let format = validate_image(key, &content)?;
            let route = self.classifier.classify_and_route(key)?;
            self.write_destination(&route, content, format).await
        }
        .await;

        if let Err(err) = &result {
            warn!(source_key = %key, outcome = "failed", reason = %err, "reactive relocation failed");
        }
        result
    }

    /// Validate `content` and write it to `route.destination_key`.
    ///
    /// Used by the reconciliation scan, which has already routed the key.
    pub(crate) async fn relocate(
        &self,
        route: &Route,
        content: Bytes,
    ) -> Result<Relocation, ProcessingError> {
        let format = validate_image(&route.source_key, &content)?;
        self.write_destination(route, content, format).await
    }

    async fn write_destination(
        &self,
        route: &Route,
        content: Bytes,
        format: ImageFormat,
    ) -> Result<Relocation, ProcessingError> {
        let content_type = format.to_mime_type().to_string();
        let size_bytes = content.len();

        self.store
            .write(&route.destination_key, content, Some(&content_type))
            .await
            .map_err(|source| ProcessingError::RelocationFailed {
                source_key: route.source_key.clone(),
                destination_key: route.destination_key.clone(),
                source,
            })?;

        info!(
            source_key = %route.source_key,
            identity = %route.matched,
            destination_key = %route.destination_key,
            outcome = "relocated",
            "relocated object"
        );

        Ok(Relocation {
            source_key: route.source_key.clone(),
            destination_key: route.destination_key.clone(),
            matched: route.matched.clone(),
            content_type,
            size_bytes,
        })
    }
}
