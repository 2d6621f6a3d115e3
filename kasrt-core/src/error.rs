use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

/// Machine-readable conflict codes returned to API clients.
pub mod codes {
    pub const ALREADY_SUBMITTED: &str = "MONTHLY_FEE_ALREADY_SUBMITTED";
    pub const DEFERRED_ACTIVE: &str = "DEFERRED_ACTIVE";
    pub const INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
    pub const BACKDATED_ENTRY: &str = "BACKDATED_ENTRY";
    pub const INVALID_STATUS: &str = "INVALID_STATUS";
}

/// Application error taxonomy.
///
/// Every fallible service operation returns this type; the `IntoResponse`
/// impl maps each variant to an HTTP status and a JSON body with an
/// optional machine-readable `code`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Business-rule conflict (duplicate submission, active deferred
    /// coverage, backdated entry, insufficient balance).
    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
    },

    #[error("not found")]
    NotFound,

    /// A fee total outside the fixed breakdown table.
    #[error("unsupported total amount: {0}")]
    UnsupportedAmount(i64),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    /// Storage-layer failure.
    #[error("storage error: {0}")]
    Store(String),

    /// OCR / image upload / network failure.
    #[error("external service error: {0}")]
    External(String),
}

impl AppError {
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::Store(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, Some(*code)),
            AppError::NotFound => (StatusCode::NOT_FOUND, None),
            AppError::UnsupportedAmount(_) => (StatusCode::UNPROCESSABLE_ENTITY, None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, None),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            AppError::External(_) => (StatusCode::BAD_GATEWAY, None),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "code": code,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let err = AppError::conflict(codes::ALREADY_SUBMITTED, "already submitted");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unsupported_amount_is_a_client_error() {
        let response = AppError::UnsupportedAmount(123456).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
