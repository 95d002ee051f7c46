//! HTTP entry points into the classification pipeline.
//!
//! - POST /process/{*key}  -> run the reactive handler on the request body
//! - GET  /classify/{*key} -> dry run: where would this key go?
//! - POST /reconcile       -> run a reconciliation scan now

use crate::{
    errors::{AppError, ProcessingError},
    models::report::ScanReport,
    services::{classifier::Route, relocation::Relocation},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};

/// Process one source object delivered in the request body.
///
/// Failures map to HTTP errors so an external trigger can retry: 422 for
/// content that is not an image, 400 for unusable keys, 502 for storage.
pub async fn process_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<Relocation>, AppError> {
    if state.relocation.classifier().is_processed_key(&key) {
        return Err(ProcessingError::InvalidKey(key).into());
    }
    let relocation = state.relocation.handle_new_object(&key, body).await?;
    Ok(Json(relocation))
}

/// Classify a key without touching storage.
pub async fn classify_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Route>, AppError> {
    let route = state.relocation.classifier().classify_and_route(&key)?;
    Ok(Json(route))
}

/// Run a full reconciliation scan and return its report.
pub async fn reconcile(State(state): State<AppState>) -> Json<ScanReport> {
    Json(state.reconciler.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::match_result::MatchResult, services::image_check::tests::sample_image,
        state::tests::memory_state,
    };
    use axum::http::StatusCode;
    use image::ImageFormat;

    #[tokio::test]
    async fn process_relocates_and_reports_destination() {
        let (state, store) = memory_state();
        let png = Bytes::from(sample_image(ImageFormat::Png));
        let Json(relocation) = process_object(
            State(state),
            Path("input/mr_mime promo.png".to_string()),
            png.clone(),
        )
        .await
        .unwrap();

        assert_eq!(relocation.destination_key, "processed/Mr. Mime/mr_mime promo.png");
        assert_eq!(store.content("processed/Mr. Mime/mr_mime promo.png"), Some(png));
    }

    #[tokio::test]
    async fn process_maps_failures_to_retryable_statuses() {
        let (state, store) = memory_state();

        let err = process_object(
            State(state.clone()),
            Path("input/pikachu.png".to_string()),
            Bytes::from_static(b"not an image"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        store.fail_writes_to("processed/Pikachu/pikachu.png");
        let err = process_object(
            State(state.clone()),
            Path("input/pikachu.png".to_string()),
            Bytes::from(sample_image(ImageFormat::Png)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let err = process_object(
            State(state),
            Path("processed/Pikachu/pikachu.png".to_string()),
            Bytes::from(sample_image(ImageFormat::Png)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn classify_is_a_dry_run() {
        let (state, store) = memory_state();
        let Json(route) = classify_object(State(state), Path("input/mystery_card_07.jpg".to_string()))
            .await
            .unwrap();
        assert_eq!(route.matched, MatchResult::Unknown);
        assert_eq!(route.destination_key, "processed/Unknown/mystery_card_07.jpg");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn reconcile_returns_scan_report() {
        let (state, store) = memory_state();
        store.insert("input/squirtle.png", sample_image(ImageFormat::Png));
        store.insert("input/notes.txt", Bytes::from_static(b"hi"));

        let Json(report) = reconcile(State(state)).await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped_not_image, 1);
        assert!(store.content("processed/Squirtle/squirtle.png").is_some());
    }
}
