//! Storage capability interface.
//!
//! All persistence runs through the [`Store`] trait so the services stay
//! independent of the backing database. Two implementations exist: a
//! mutex-guarded in-memory store (tests, local development) and a
//! Postgres store built on sqlx.
//!
//! Methods that must be atomic read-modify-write units — appending CASH
//! ledger entries and releasing a deferred month — are single trait
//! methods so each backend can wrap them in its own critical section.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    DeferredSubscription, LedgerEntry, MonthlyFeePayment, NewLedgerEntry, NewPayment,
    NewSubscription, PaymentStatus, Period, Resident, RwSubmission, SubmissionSummary, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), AppError>;

    // ---- residents ----

    /// All residents in ascending id order.
    async fn list_residents(&self) -> Result<Vec<Resident>, AppError>;

    async fn find_resident(
        &self,
        block: &str,
        house_number: &str,
    ) -> Result<Option<Resident>, AppError>;

    // ---- users ----

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    // ---- monthly fee payments ----

    /// Create a payment. Fails with a `MONTHLY_FEE_ALREADY_SUBMITTED`
    /// conflict when a record already exists for the same
    /// (block, house_number, period).
    async fn create_payment(&self, new: NewPayment) -> Result<MonthlyFeePayment, AppError>;

    async fn get_payment(&self, id: Uuid) -> Result<Option<MonthlyFeePayment>, AppError>;

    async fn find_payment(
        &self,
        block: &str,
        house_number: &str,
        period: &Period,
    ) -> Result<Option<MonthlyFeePayment>, AppError>;

    /// Up to `limit` PENDING payments, oldest first.
    async fn pending_payments(&self, limit: usize) -> Result<Vec<MonthlyFeePayment>, AppError>;

    async fn mark_payment_processing(&self, id: Uuid) -> Result<(), AppError>;

    /// Record a finished OCR pass: raw text, extracted amount (kept as-is
    /// when `None`), next status, attempt counter bumped.
    async fn record_ocr_result(
        &self,
        id: Uuid,
        raw_text: &str,
        amount: Option<i64>,
        status: PaymentStatus,
    ) -> Result<MonthlyFeePayment, AppError>;

    /// Record a per-item OCR failure: FAILED status, error message,
    /// attempt counter bumped.
    async fn record_ocr_failure(&self, id: Uuid, error: &str) -> Result<(), AppError>;

    /// Apply a human review action (approve / reject / manual amount).
    async fn review_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        amount: Option<i64>,
        notes: Option<String>,
    ) -> Result<MonthlyFeePayment, AppError>;

    /// COMPLETED payments for a period.
    async fn completed_payments(&self, period: &Period)
        -> Result<Vec<MonthlyFeePayment>, AppError>;

    /// COMPLETED payments not yet linked to an RW submission, optionally
    /// filtered by period, ordered by period, block, house number.
    async fn unsubmitted_payments(
        &self,
        period: Option<&Period>,
    ) -> Result<Vec<MonthlyFeePayment>, AppError>;

    /// Of the given ids, those still COMPLETED and unlinked.
    async fn payments_awaiting_submission(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<MonthlyFeePayment>, AppError>;

    // ---- deferred subscriptions ----

    async fn create_subscription(
        &self,
        new: NewSubscription,
    ) -> Result<DeferredSubscription, AppError>;

    async fn list_subscriptions(&self) -> Result<Vec<DeferredSubscription>, AppError>;

    async fn list_active_subscriptions(&self) -> Result<Vec<DeferredSubscription>, AppError>;

    async fn find_active_subscription(
        &self,
        block: &str,
        house_number: &str,
    ) -> Result<Option<DeferredSubscription>, AppError>;

    async fn deactivate_subscription(&self, id: Uuid) -> Result<DeferredSubscription, AppError>;

    /// Atomically append the DEFERRED ledger event and consume one month
    /// of the subscription. Returns `None` when the subscription is no
    /// longer eligible (inactive or exhausted) by the time the critical
    /// section runs.
    async fn release_subscription(
        &self,
        id: Uuid,
        event: NewLedgerEntry,
    ) -> Result<Option<DeferredSubscription>, AppError>;

    // ---- cash ledger ----

    /// Atomically append one entry. For the CASH bucket the running
    /// balance is computed against the latest CASH entry inside the
    /// critical section; DEFERRED entries persist with a null balance.
    async fn append_ledger_entry(&self, new: NewLedgerEntry) -> Result<LedgerEntry, AppError>;

    /// Atomically append an ordered batch; any row driving the CASH
    /// balance negative aborts the whole batch with no partial commit.
    async fn append_ledger_entries(
        &self,
        batch: Vec<NewLedgerEntry>,
    ) -> Result<Vec<LedgerEntry>, AppError>;

    /// All entries, newest first.
    async fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>, AppError>;

    /// The most recent CASH entry's balance, or 0 for an empty ledger.
    async fn latest_cash_balance(&self) -> Result<i64, AppError>;

    // ---- RW submissions ----

    /// Atomically create a submission and link the given payments to it.
    async fn create_submission(
        &self,
        period: Period,
        total_amount: i64,
        notes: Option<String>,
        payment_ids: &[Uuid],
    ) -> Result<RwSubmission, AppError>;

    /// Submissions newest first, optionally filtered by a period prefix
    /// ("2026" or "2026-01").
    async fn list_submissions(
        &self,
        period_prefix: Option<&str>,
    ) -> Result<Vec<SubmissionSummary>, AppError>;

    async fn get_submission(
        &self,
        id: Uuid,
    ) -> Result<Option<(RwSubmission, Vec<MonthlyFeePayment>)>, AppError>;
}
