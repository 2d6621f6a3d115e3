use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::period::Period;

/// Minimum extracted amount considered trustworthy enough for the
/// one-click approval flow. Anything below goes to manual input.
pub const APPROVAL_THRESHOLD: i64 = 100_000;

/// Lifecycle states of a monthly-fee payment record.
///
/// Created as `Pending` (manual submission) or directly with an extracted
/// amount (synchronous photo upload). The OCR batch moves records to
/// `WaitingApproval` or `WaitingManualInput`; a human then completes or
/// rejects them. `Failed` captures per-item batch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    WaitingApproval,
    WaitingManualInput,
    Completed,
    Rejected,
    Failed,
}

impl PaymentStatus {
    /// Status after OCR extraction: amounts at or above the approval
    /// threshold only need a confirmation tap, everything else needs a
    /// typed-in amount.
    pub fn after_extraction(amount: Option<i64>) -> PaymentStatus {
        match amount {
            Some(a) if a >= APPROVAL_THRESHOLD => PaymentStatus::WaitingApproval,
            _ => PaymentStatus::WaitingManualInput,
        }
    }

    /// Whether a human approve/reject/manual-amount action is valid from
    /// this state.
    pub fn awaiting_review(self) -> bool {
        matches!(
            self,
            PaymentStatus::WaitingApproval | PaymentStatus::WaitingManualInput
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::WaitingApproval => "WAITING_APPROVAL",
            PaymentStatus::WaitingManualInput => "WAITING_MANUAL_INPUT",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A monthly-fee payment proof submitted by (or for) a resident.
///
/// At most one record may exist per (block, house_number, period); the
/// store enforces that.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFeePayment {
    pub id: Uuid,
    pub block: String,
    pub house_number: String,
    pub period: Period,
    pub full_name: String,
    /// Extracted (or manually entered) amount in whole currency units.
    pub amount: Option<i64>,
    pub status: PaymentStatus,
    /// Raw OCR output the amount was extracted from.
    pub raw_text: Option<String>,
    pub image_url: String,
    pub notes: Option<String>,
    pub attempt: i32,
    pub error_message: Option<String>,
    pub rw_submission_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Payment creation request used by the reconciler.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub block: String,
    pub house_number: String,
    pub period: Period,
    pub full_name: String,
    pub amount: Option<i64>,
    pub status: PaymentStatus,
    pub raw_text: Option<String>,
    pub image_url: String,
    pub notes: Option<String>,
}
