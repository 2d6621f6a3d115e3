use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::deferred::CreateSubscriptionRequest;
use crate::error::AppError;
use crate::models::DeferredSubscription;
use crate::state::AppState;

/// `POST /api/deferred-subscription`
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<DeferredSubscription>), AppError> {
    let sub = state.deferred.create(req).await?;
    Ok((StatusCode::CREATED, Json(sub)))
}

/// `GET /api/deferred-subscription`
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeferredSubscription>>, AppError> {
    Ok(Json(state.deferred.list().await?))
}

/// `GET /api/deferred-subscription/active`
pub async fn list_active(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeferredSubscription>>, AppError> {
    Ok(Json(state.deferred.list_active().await?))
}

/// `PATCH /api/deferred-subscription/:id/deactivate`
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeferredSubscription>, AppError> {
    Ok(Json(state.deferred.deactivate(id).await?))
}
