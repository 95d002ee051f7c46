//! Represents an object (file) stored in the container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a single object within a container.
///
/// The payload bytes live on disk; this struct only describes them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent container.
    pub container_id: Uuid,

    /// Object key (path-like identifier within the container).
    pub key: String,

    /// Last path segment of the key.
    pub filename: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: Option<String>,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,
}

/// Backend-neutral view of a stored object, as returned by listings and writes.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl From<Object> for ObjectInfo {
    fn from(obj: Object) -> Self {
        Self {
            key: obj.key,
            size_bytes: obj.size_bytes,
            content_type: obj.content_type,
            etag: obj.etag,
            last_modified: obj.last_modified,
        }
    }
}
