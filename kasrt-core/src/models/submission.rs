use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::period::Period;

/// A batch of COMPLETED payments reported upward to the RW level.
///
/// `total_amount` is the sum of the linked payments' amounts; linked
/// payments are excluded from future pending-submission queries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RwSubmission {
    pub id: Uuid,
    pub period: Period,
    pub total_amount: i64,
    pub submitted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Submission list row with the number of linked payment records.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub id: Uuid,
    pub period: Period,
    pub total_amount: i64,
    pub submitted_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub record_count: i64,
}
