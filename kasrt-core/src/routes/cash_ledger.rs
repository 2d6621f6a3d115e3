use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::ledger::PostEntryRequest;
use crate::models::LedgerEntry;
use crate::state::AppState;

/// `POST /api/cash-ledger`
pub async fn post_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PostEntryRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), AppError> {
    let entry = state.ledger.post_entry(req, &user.name).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /api/cash-ledger` — all entries, newest first.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(state.ledger.list().await?))
}

/// `GET /api/cash-ledger/balance`
pub async fn balance(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let balance = state.ledger.latest_balance().await?;
    Ok(Json(serde_json::json!({ "balance": balance })))
}

/// `POST /api/cash-ledger/import-csv` — multipart upload with a `file`
/// field; imports the whole sheet as one atomic batch.
pub async fn import_csv(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut file: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(format!("Invalid file upload: {e}")))?;
            file = Some(bytes.to_vec());
        }
    }
    let file = file.ok_or_else(|| AppError::validation("Missing 'file' field"))?;

    let inserted = state.ledger.import_csv(file.as_slice(), &user.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "imported": inserted.len(),
            "entries": inserted
        })),
    ))
}
