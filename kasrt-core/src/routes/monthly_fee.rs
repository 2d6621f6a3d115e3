use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::{MonthlyFeePayment, Period, RwSubmission, SubmissionSummary};
use crate::reconcile::{BreakdownResponse, SubmitOutcome};
use crate::state::AppState;
use crate::submission::{PendingSubmission, SubmissionDetail, SubmitToRwRequest};

/// `POST /api/monthly-fee` — multipart with `block`, `houseNumber`,
/// `period` and the proof photo in `image`.
pub async fn submit_with_proof(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitOutcome>), AppError> {
    let mut block = None;
    let mut house_number = None;
    let mut period = None;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("block") => block = Some(read_text(field).await?),
            Some("houseNumber") => house_number = Some(read_text(field).await?),
            Some("period") => period = Some(read_text(field).await?),
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid image upload: {e}")))?;
                image = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let block = block.ok_or_else(|| AppError::validation("Missing 'block' field"))?;
    let house_number =
        house_number.ok_or_else(|| AppError::validation("Missing 'houseNumber' field"))?;
    let period = Period::parse(
        &period.ok_or_else(|| AppError::validation("Missing 'period' field"))?,
    )?;
    let image = image.ok_or_else(|| AppError::validation("Missing 'image' field"))?;

    let outcome = state
        .reconciler
        .submit_with_proof(&block, &house_number, period, &image)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart field: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSubmitRequest {
    pub block: String,
    pub house_number: String,
    pub period: String,
    pub name: String,
    pub notes: Option<String>,
    pub image_url: String,
}

/// `POST /api/monthly-fee-manual` — the image is already hosted; the
/// record queues for the OCR batch.
pub async fn submit_manual(
    State(state): State<AppState>,
    Json(req): Json<ManualSubmitRequest>,
) -> Result<(StatusCode, Json<MonthlyFeePayment>), AppError> {
    let period = Period::parse(&req.period)?;
    let payment = state
        .reconciler
        .submit_manual(
            &req.block,
            &req.house_number,
            period,
            &req.name,
            req.notes,
            &req.image_url,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    pub block: String,
    pub house_number: String,
    pub period: String,
}

/// `GET /api/monthly-fee-validate` — pre-submission eligibility check.
pub async fn validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let period = Period::parse(&query.period)?;
    state
        .reconciler
        .validate_eligibility(&query.block, &query.house_number, &period)
        .await?;
    Ok(Json(serde_json::json!({ "eligible": true })))
}

/// `GET /api/monthly-fee/breakdown/:year/:month`
pub async fn breakdown_view(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<BreakdownResponse>, AppError> {
    let period = Period::parse(&format!("{year}-{month:0>2}"))?;
    Ok(Json(state.reconciler.build_period_breakdown(&period).await?))
}

/// `POST /api/monthly-fee/:id/approve`
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MonthlyFeePayment>, AppError> {
    Ok(Json(state.reconciler.approve(id).await?))
}

/// `POST /api/monthly-fee/:id/reject`
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MonthlyFeePayment>, AppError> {
    Ok(Json(state.reconciler.reject(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ManualAmountRequest {
    pub amount: i64,
}

/// `POST /api/monthly-fee/:id/manual-amount`
pub async fn manual_amount(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<ManualAmountRequest>,
) -> Result<Json<MonthlyFeePayment>, AppError> {
    Ok(Json(
        state
            .reconciler
            .manual_amount(id, req.amount, &user.name)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub period: Option<String>,
}

/// `GET /api/monthly-fee/pending-submission`
pub async fn pending_submission(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingSubmission>, AppError> {
    let period = query.period.as_deref().map(Period::parse).transpose()?;
    Ok(Json(state.submissions.pending(period.as_ref()).await?))
}

/// `POST /api/monthly-fee/submit-to-rw`
pub async fn submit_to_rw(
    State(state): State<AppState>,
    Json(req): Json<SubmitToRwRequest>,
) -> Result<(StatusCode, Json<RwSubmission>), AppError> {
    let submission = state.submissions.submit_to_rw(req).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    pub year: Option<String>,
    pub month: Option<String>,
}

/// `GET /api/monthly-fee/rw-submissions` — optional year/month filter.
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionsQuery>,
) -> Result<Json<Vec<SubmissionSummary>>, AppError> {
    let prefix = match (query.year, query.month) {
        (Some(year), Some(month)) => Some(format!("{year}-{month:0>2}")),
        (Some(year), None) => Some(year),
        (None, Some(_)) => {
            return Err(AppError::validation("month filter requires year"));
        }
        (None, None) => None,
    };
    Ok(Json(state.submissions.list(prefix.as_deref()).await?))
}

/// `GET /api/monthly-fee/rw-submissions/:id`
pub async fn submission_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionDetail>, AppError> {
    Ok(Json(state.submissions.detail(id).await?))
}
