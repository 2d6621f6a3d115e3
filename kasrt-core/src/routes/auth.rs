use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::auth::{issue_token, CurrentUser};
use crate::error::AppError;
use crate::models::UserResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// `POST /api/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .store
        .find_user_by_email(req.email.trim())
        .await?
        .ok_or(AppError::Unauthorized)?;

    let valid = bcrypt::verify(&req.password, &user.password_hash)
        .map_err(|e| AppError::Store(e.to_string()))?;
    if !valid {
        return Err(AppError::Unauthorized);
    }

    let token = issue_token(&user, &state.config.jwt_secret)?;
    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(&user),
    }))
}

/// `GET /api/auth/validate` — echoes the authenticated identity.
pub async fn validate(
    Extension(user): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": user.id,
        "name": user.name,
        "role": user.role
    }))
}
