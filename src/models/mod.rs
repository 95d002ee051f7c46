//! Core data models for the card sorting service.
//!
//! Storage rows (`container`, `object`) map to database tables via
//! `sqlx::FromRow`; the rest are derived values of the classification
//! pipeline and serialize as JSON via `serde`.

pub mod catalog;
pub mod container;
pub mod match_result;
pub mod object;
pub mod report;
