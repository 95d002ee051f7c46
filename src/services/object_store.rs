//! The object storage capability the pipeline runs against.
//!
//! Everything the classifier needs from storage goes through [`ObjectStore`],
//! so the reactive handler and the reconciliation scan can run against the
//! SQLite-backed store in production and an in-memory fake in tests.

use crate::models::object::ObjectInfo;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("container `{name}` invalid: {reason}")]
    InvalidContainerName { name: String, reason: String },
    #[error("object `{key}` not found in container `{container}`")]
    ObjectNotFound { container: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One page of a prefix listing, in lexicographic key order.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    /// Pass as `start_after` to fetch the next page; `None` on the last page.
    pub next_start_after: Option<String>,
}

/// Outcome of one readiness check.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub error: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `max_keys` objects whose key starts with `prefix`,
    /// strictly after `start_after`.
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage>;

    /// Metadata of a single object.
    async fn stat(&self, key: &str) -> StorageResult<ObjectInfo>;

    /// Read an object's full payload.
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Write `content` at `key`, replacing whatever was there.
    ///
    /// The write is all-or-nothing: readers see either the old or the new
    /// payload, never a partial one.
    async fn write(
        &self,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectInfo>;

    /// Metadata-only existence probe. Never reads the payload.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Backend health checks for the readiness endpoint.
    async fn readiness(&self) -> Vec<ReadinessCheck> {
        Vec::new()
    }
}
