//! Bearer-token authentication and the cron-secret guard.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// Claims carried inside the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user's UUID as a string.
    pub sub: String,
    pub name: String,
    pub role: String,
    pub exp: usize,
}

/// The authenticated user, stored in request extensions by
/// [`require_auth`].
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

/// Issue a 7-day token for a logged-in user.
pub fn issue_token(user: &User, secret: &str) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.id.to_string(),
        name: user.name.clone(),
        role: user.role.clone(),
        exp: (Utc::now() + Duration::days(7)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Store(format!("token encoding failed: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> Result<CurrentUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let id = Uuid::parse_str(&decoded.claims.sub).map_err(|_| AppError::Unauthorized)?;
    Ok(CurrentUser {
        id,
        name: decoded.claims.name,
        role: decoded.claims.role,
    })
}

/// Middleware validating a Bearer JWT in the `Authorization` header.
///
/// On success the [`CurrentUser`] lands in request extensions; on any
/// failure the request stops with a 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let user = verify_token(token, &state.config.jwt_secret)?;
    if !matches!(user.role.as_str(), "admin" | "bendahara" | "rt") {
        return Err(AppError::Forbidden);
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Guard for the cron endpoints: `x-cron-secret` must match the
/// configured secret exactly. An unconfigured secret rejects everything.
pub fn require_cron_secret(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let provided = headers
        .get("x-cron-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if expected.is_empty() || provided != expected {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "bendahara@rt.local".to_string(),
            password_hash: "unused".to_string(),
            name: "Bu Bendahara".to_string(),
            role: "bendahara".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trips_identity() {
        let user = user();
        let token = issue_token(&user, "test-secret").unwrap();
        let current = verify_token(&token, "test-secret").unwrap();
        assert_eq!(current.id, user.id);
        assert_eq!(current.role, "bendahara");
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = issue_token(&user(), "test-secret").unwrap();
        assert!(matches!(
            verify_token(&token, "other-secret").unwrap_err(),
            AppError::Unauthorized
        ));
        assert!(matches!(
            verify_token("garbage", "test-secret").unwrap_err(),
            AppError::Unauthorized
        ));
    }

    #[test]
    fn cron_secret_must_match() {
        let mut headers = HeaderMap::new();
        assert!(require_cron_secret(&headers, "s3cret").is_err());

        headers.insert("x-cron-secret", "wrong".parse().unwrap());
        assert!(require_cron_secret(&headers, "s3cret").is_err());

        headers.insert("x-cron-secret", "s3cret".parse().unwrap());
        assert!(require_cron_secret(&headers, "s3cret").is_ok());

        // An empty configured secret never authorizes.
        assert!(require_cron_secret(&headers, "").is_err());
    }
}
