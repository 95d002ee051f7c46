//! Represents a container — the top-level namespace objects live in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage container owned by one account.
///
/// The service works against a single container; its row is created on
/// first open and reused afterwards.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Container {
    /// Unique identifier for this container (UUID for internal DB use).
    pub id: Uuid,

    /// Account the container belongs to.
    pub account: String,

    /// Container name, unique per account.
    pub name: String,

    /// When this container was created.
    pub created_at: DateTime<Utc>,
}
