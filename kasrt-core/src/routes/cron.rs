use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;

use crate::auth::require_cron_secret;
use crate::error::AppError;
use crate::models::Period;
use crate::state::AppState;

/// `POST /api/cron/run-ocr` — process one batch of queued OCR jobs.
pub async fn run_ocr(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_cron_secret(&headers, &state.config.cron_secret)?;
    let processed = state
        .reconciler
        .run_batch_ocr(state.config.ocr_batch_size)
        .await?;
    Ok(Json(serde_json::json!({ "processed": processed })))
}

/// `POST /api/cron/release-deferred/:period` — consume one month of every
/// eligible active subscription.
pub async fn release_deferred(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_cron_secret(&headers, &state.config.cron_secret)?;
    let period = Period::parse(&period)?;
    let outcome = state.deferred.release_month(&period).await?;
    Ok(Json(serde_json::json!({
        "period": period,
        "processed": outcome.processed,
        "skipped": outcome.skipped
    })))
}
