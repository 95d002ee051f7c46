//! Defines routes for the card sorter.
//!
//! ## Structure
//! - **Object endpoints** (raw storage on the configured container)
//!   - `GET    /objects` — list objects (supports prefix, max-keys, continuation-token)
//!   - `PUT    /objects/{*key}` — upload object; input keys are processed in the background
//!   - `GET    /objects/{*key}` — download object
//!   - `HEAD   /objects/{*key}` — retrieve metadata only
//!
//! - **Pipeline endpoints**
//!   - `POST   /process/{*key}` — classify and relocate the request body
//!   - `GET    /classify/{*key}` — dry-run classification
//!   - `POST   /reconcile` — run a reconciliation scan now
//!
//! The wildcard `*key` allows nested keys like `input/2025/pikachu.jpg`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object, list_objects, upload_object},
        pipeline_handlers::{classify_object, process_object, reconcile},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build and return the router for all routes.
///
/// Request bodies larger than `max_object_bytes` are rejected before they
/// reach a handler.
pub fn routes(max_object_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Object-level routes
        .route("/objects", get(list_objects))
        .route(
            "/objects/{*key}",
            put(upload_object).get(get_object).head(head_object),
        )
        // Pipeline routes
        .route("/process/{*key}", post(process_object))
        .route("/classify/{*key}", get(classify_object))
        .route("/reconcile", post(reconcile))
        .layer(DefaultBodyLimit::max(max_object_bytes))
}
