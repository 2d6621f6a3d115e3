use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::period::Period;

/// A prepaid multi-month fee commitment, consumed one month at a time.
///
/// `remaining` starts at `total_amount` and decreases by `monthly_amount`
/// on each release; the subscription deactivates when it reaches zero.
/// While active, `remaining` is always a non-negative multiple of
/// `monthly_amount`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeferredSubscription {
    pub id: Uuid,
    pub block: String,
    pub house_number: String,
    pub total_amount: i64,
    pub monthly_amount: i64,
    pub remaining: i64,
    pub start_month: Period,
    pub end_month: Period,
    pub is_active: bool,
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeferredSubscription {
    /// Whether the inclusive [start_month, end_month] range contains the
    /// given period.
    pub fn covers(&self, period: &Period) -> bool {
        *period >= self.start_month && *period <= self.end_month
    }
}

/// Validated subscription creation request.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub block: String,
    pub house_number: String,
    pub total_amount: i64,
    pub monthly_amount: i64,
    pub start_month: Period,
    pub end_month: Period,
    pub source_ref: Option<String>,
}
