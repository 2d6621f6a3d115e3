use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    In,
    Out,
}

/// Ledger partition.
///
/// `Cash` entries carry a running balance; `Deferred` entries are event
/// logs for prepaid subscriptions and never carry a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Bucket {
    Cash,
    Deferred,
}

/// Origin of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrySource {
    Manual,
    MonthlyFee,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::In => f.write_str("IN"),
            EntryType::Out => f.write_str("OUT"),
        }
    }
}

/// A posted cash-ledger entry.
///
/// For the CASH bucket `balance` is the running sum after this entry and
/// entries are strictly ordered by creation; for DEFERRED it is always
/// `None`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub entry_type: EntryType,
    pub amount: i64,
    pub bucket: Bucket,
    pub balance: Option<i64>,
    pub description: String,
    pub date: DateTime<Utc>,
    pub source: EntrySource,
    pub source_ref: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An entry about to be appended; the store computes `balance` inside its
/// atomic section.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub entry_type: EntryType,
    pub amount: i64,
    pub bucket: Bucket,
    pub description: String,
    pub date: DateTime<Utc>,
    pub source: EntrySource,
    pub source_ref: Option<String>,
    pub created_by: String,
}
