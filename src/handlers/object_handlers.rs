//! HTTP handlers for raw object operations on the configured container.
//!
//! Uploads under the input prefix are the event source of the pipeline:
//! once stored, the object is handed to the reactive handler in the
//! background and the upload itself responds immediately.

use crate::{
    errors::AppError, models::object::ObjectInfo, services::storage_service::MAX_LIST_KEYS,
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Query params accepted by the listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<usize>,
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListObjectsResponse {
    pub prefix: String,
    pub max_keys: usize,
    pub key_count: usize,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    pub objects: Vec<ObjectInfo>,
}

/// Upload an object to `/objects/{*key}`, overwriting any existing one.
pub async fn upload_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let info = state
        .store
        .write(&key, body.clone(), content_type.as_deref())
        .await?;

    if state.reconciler.is_input_key(&key) {
        let relocation = state.relocation.clone();
        let source_key = key.clone();
        tokio::spawn(async move {
            if relocation.handle_new_object(&source_key, body).await.is_err() {
                debug!(source_key = %source_key, "left for the next reconciliation scan");
            }
        });
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_etag(response.headers_mut(), &info);
    Ok(response)
}

/// Download an object `/objects/{*key}`.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let info = state.store.stat(&key).await?;
    let content = state.store.read(&key).await?;

    let mut response = Response::new(Body::from(content));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// HEAD `/objects/{*key}` — same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let info = state.store.stat(&key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// GET `/objects` — list objects, supports ?prefix=&max-keys=&continuation-token=
pub async fn list_objects(
    State(state): State<AppState>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<ListObjectsResponse>, AppError> {
    let prefix = q.prefix.unwrap_or_default();
    let max_keys = q.max_keys.unwrap_or(MAX_LIST_KEYS).clamp(1, MAX_LIST_KEYS);
    let start_after = q
        .continuation_token
        .as_deref()
        .map(decode_continuation_token);

    let page = state
        .store
        .list_page(&prefix, start_after.as_deref(), max_keys)
        .await?;

    Ok(Json(ListObjectsResponse {
        prefix,
        max_keys,
        key_count: page.objects.len(),
        is_truncated: page.next_start_after.is_some(),
        next_continuation_token: page
            .next_start_after
            .as_deref()
            .map(encode_continuation_token),
        objects: page.objects,
    }))
}

fn set_etag(headers: &mut HeaderMap, info: &ObjectInfo) {
    if let Some(etag) = info.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }
}

fn set_object_headers(headers: &mut HeaderMap, info: &ObjectInfo) {
    let content_type = info
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&info.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    set_etag(headers, info);

    if let Ok(value) = HeaderValue::from_str(&info.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn encode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}
