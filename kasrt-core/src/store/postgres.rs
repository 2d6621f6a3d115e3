//! Postgres-backed store.
//!
//! Plain runtime queries over a `PgPool`. The atomic units (ledger
//! appends, deferred release, submission linking) run inside database
//! transactions; ledger appends additionally take a transaction-scoped
//! advisory lock so the read-latest-then-insert sequence is serialized
//! across connections.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Postgres;
use uuid::Uuid;

use crate::error::{codes, AppError};
use crate::ledger::next_cash_balance;
use crate::models::{
    Bucket, DeferredSubscription, LedgerEntry, MonthlyFeePayment, NewLedgerEntry, NewPayment,
    NewSubscription, PaymentStatus, Period, Resident, RwSubmission, SubmissionSummary, User,
};

use super::Store;

const PAYMENT_COLUMNS: &str = "id, block, house_number, period, full_name, amount, status, \
     raw_text, image_url, notes, attempt, error_message, rw_submission_id, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, block, house_number, total_amount, monthly_amount, \
     remaining, start_month, end_month, is_active, source_ref, created_at";

const LEDGER_COLUMNS: &str = "id, entry_type, amount, bucket, balance, description, date, \
     source, source_ref, created_by, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == "23505")
            .unwrap_or(false)
    }

    /// Append one entry inside an already-open transaction holding the
    /// ledger advisory lock.
    async fn append_in_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        new: NewLedgerEntry,
    ) -> Result<LedgerEntry, AppError> {
        let balance = match new.bucket {
            Bucket::Cash => {
                let last: Option<(i64, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
                    "SELECT balance, date FROM cash_ledger \
                     WHERE bucket = 'CASH' AND balance IS NOT NULL \
                     ORDER BY seq DESC LIMIT 1",
                )
                .fetch_optional(&mut **tx)
                .await?;
                Some(next_cash_balance(last, new.date, new.entry_type, new.amount)?)
            }
            Bucket::Deferred => None,
        };

        let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
            "INSERT INTO cash_ledger \
             (id, entry_type, amount, bucket, balance, description, date, source, source_ref, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.entry_type)
        .bind(new.amount)
        .bind(new.bucket)
        .bind(balance)
        .bind(new.description)
        .bind(new.date)
        .bind(new.source)
        .bind(new.source_ref)
        .bind(new.created_by)
        .fetch_one(&mut **tx)
        .await?;

        Ok(entry)
    }

    async fn take_ledger_lock(
        tx: &mut sqlx::Transaction<'_, Postgres>,
    ) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('cash_ledger'))")
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_residents(&self) -> Result<Vec<Resident>, AppError> {
        let residents = sqlx::query_as::<_, Resident>(
            "SELECT id, block, house_number, full_name FROM residents ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(residents)
    }

    async fn find_resident(
        &self,
        block: &str,
        house_number: &str,
    ) -> Result<Option<Resident>, AppError> {
        let resident = sqlx::query_as::<_, Resident>(
            "SELECT id, block, house_number, full_name FROM residents \
             WHERE block = $1 AND house_number = $2",
        )
        .bind(block)
        .bind(house_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(resident)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, name, role, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_payment(&self, new: NewPayment) -> Result<MonthlyFeePayment, AppError> {
        let result = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "INSERT INTO monthly_fee_payments \
             (id, block, house_number, period, full_name, amount, status, raw_text, image_url, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.block)
        .bind(&new.house_number)
        .bind(&new.period)
        .bind(&new.full_name)
        .bind(new.amount)
        .bind(new.status)
        .bind(&new.raw_text)
        .bind(&new.image_url)
        .bind(&new.notes)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(payment) => Ok(payment),
            Err(err) if Self::is_unique_violation(&err) => Err(AppError::conflict(
                codes::ALREADY_SUBMITTED,
                "Monthly fee for this house and month has already been submitted",
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<MonthlyFeePayment>, AppError> {
        let payment = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn find_payment(
        &self,
        block: &str,
        house_number: &str,
        period: &Period,
    ) -> Result<Option<MonthlyFeePayment>, AppError> {
        let payment = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments \
             WHERE block = $1 AND house_number = $2 AND period = $3"
        ))
        .bind(block)
        .bind(house_number)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn pending_payments(&self, limit: usize) -> Result<Vec<MonthlyFeePayment>, AppError> {
        let payments = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments \
             WHERE status = 'PENDING' ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn mark_payment_processing(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE monthly_fee_payments SET status = 'PROCESSING' WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn record_ocr_result(
        &self,
        id: Uuid,
        raw_text: &str,
        amount: Option<i64>,
        status: PaymentStatus,
    ) -> Result<MonthlyFeePayment, AppError> {
        let payment = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "UPDATE monthly_fee_payments \
             SET raw_text = $2, amount = COALESCE($3, amount), status = $4, attempt = attempt + 1 \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(raw_text)
        .bind(amount)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;
        Ok(payment)
    }

    async fn record_ocr_failure(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE monthly_fee_payments \
             SET status = 'FAILED', error_message = $2, attempt = attempt + 1 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn review_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        amount: Option<i64>,
        notes: Option<String>,
    ) -> Result<MonthlyFeePayment, AppError> {
        let payment = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "UPDATE monthly_fee_payments \
             SET status = $2, amount = COALESCE($3, amount), notes = COALESCE($4, notes) \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(amount)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;
        Ok(payment)
    }

    async fn completed_payments(
        &self,
        period: &Period,
    ) -> Result<Vec<MonthlyFeePayment>, AppError> {
        let payments = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments \
             WHERE status = 'COMPLETED' AND period = $1"
        ))
        .bind(period)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn unsubmitted_payments(
        &self,
        period: Option<&Period>,
    ) -> Result<Vec<MonthlyFeePayment>, AppError> {
        let payments = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments \
             WHERE status = 'COMPLETED' AND rw_submission_id IS NULL \
               AND ($1::text IS NULL OR period = $1) \
             ORDER BY period, block, house_number"
        ))
        .bind(period)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn payments_awaiting_submission(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<MonthlyFeePayment>, AppError> {
        let payments = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments \
             WHERE id = ANY($1) AND status = 'COMPLETED' AND rw_submission_id IS NULL"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn create_subscription(
        &self,
        new: NewSubscription,
    ) -> Result<DeferredSubscription, AppError> {
        let subscription = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "INSERT INTO deferred_subscriptions \
             (id, block, house_number, total_amount, monthly_amount, remaining, \
              start_month, end_month, is_active, source_ref) \
             VALUES ($1, $2, $3, $4, $5, $4, $6, $7, TRUE, $8) \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.block)
        .bind(&new.house_number)
        .bind(new.total_amount)
        .bind(new.monthly_amount)
        .bind(&new.start_month)
        .bind(&new.end_month)
        .bind(&new.source_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn list_subscriptions(&self) -> Result<Vec<DeferredSubscription>, AppError> {
        let subs = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM deferred_subscriptions ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<DeferredSubscription>, AppError> {
        let subs = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM deferred_subscriptions \
             WHERE is_active ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn find_active_subscription(
        &self,
        block: &str,
        house_number: &str,
    ) -> Result<Option<DeferredSubscription>, AppError> {
        let sub = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM deferred_subscriptions \
             WHERE is_active AND block = $1 AND house_number = $2 LIMIT 1"
        ))
        .bind(block)
        .bind(house_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn deactivate_subscription(&self, id: Uuid) -> Result<DeferredSubscription, AppError> {
        let sub = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "UPDATE deferred_subscriptions SET is_active = FALSE \
             WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;
        Ok(sub)
    }

    async fn release_subscription(
        &self,
        id: Uuid,
        event: NewLedgerEntry,
    ) -> Result<Option<DeferredSubscription>, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::take_ledger_lock(&mut tx).await?;

        let current = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM deferred_subscriptions \
             WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        if !current.is_active || current.remaining < current.monthly_amount {
            tx.rollback().await?;
            return Ok(None);
        }

        Self::append_in_tx(&mut tx, event).await?;

        let updated = sqlx::query_as::<_, DeferredSubscription>(&format!(
            "UPDATE deferred_subscriptions \
             SET remaining = remaining - monthly_amount, \
                 is_active = remaining - monthly_amount > 0 \
             WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn append_ledger_entry(&self, new: NewLedgerEntry) -> Result<LedgerEntry, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::take_ledger_lock(&mut tx).await?;
        let entry = Self::append_in_tx(&mut tx, new).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn append_ledger_entries(
        &self,
        batch: Vec<NewLedgerEntry>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::take_ledger_lock(&mut tx).await?;

        let mut inserted = Vec::with_capacity(batch.len());
        for new in batch {
            // Any failed row rolls the transaction back on drop.
            inserted.push(Self::append_in_tx(&mut tx, new).await?);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>, AppError> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM cash_ledger ORDER BY seq DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn latest_cash_balance(&self) -> Result<i64, AppError> {
        let balance: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT balance FROM cash_ledger WHERE bucket = 'CASH' \
             ORDER BY seq DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance.and_then(|(b,)| b).unwrap_or(0))
    }

    async fn create_submission(
        &self,
        period: Period,
        total_amount: i64,
        notes: Option<String>,
        payment_ids: &[Uuid],
    ) -> Result<RwSubmission, AppError> {
        let mut tx = self.pool.begin().await?;

        let submission = sqlx::query_as::<_, RwSubmission>(
            "INSERT INTO rw_submissions (id, period, total_amount, notes) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, period, total_amount, submitted_at, notes",
        )
        .bind(Uuid::new_v4())
        .bind(&period)
        .bind(total_amount)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE monthly_fee_payments SET rw_submission_id = $1 \
             WHERE id = ANY($2) AND status = 'COMPLETED' AND rw_submission_id IS NULL",
        )
        .bind(submission.id)
        .bind(payment_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(submission)
    }

    async fn list_submissions(
        &self,
        period_prefix: Option<&str>,
    ) -> Result<Vec<SubmissionSummary>, AppError> {
        let summaries = sqlx::query_as::<_, SubmissionSummary>(
            "SELECT s.id, s.period, s.total_amount, s.submitted_at, s.notes, \
                    COUNT(p.id) AS record_count \
             FROM rw_submissions s \
             LEFT JOIN monthly_fee_payments p ON p.rw_submission_id = s.id \
             WHERE ($1::text IS NULL OR s.period LIKE $1 || '%') \
             GROUP BY s.id, s.period, s.total_amount, s.submitted_at, s.notes \
             ORDER BY s.submitted_at DESC",
        )
        .bind(period_prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    async fn get_submission(
        &self,
        id: Uuid,
    ) -> Result<Option<(RwSubmission, Vec<MonthlyFeePayment>)>, AppError> {
        let Some(submission) = sqlx::query_as::<_, RwSubmission>(
            "SELECT id, period, total_amount, submitted_at, notes \
             FROM rw_submissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let payments = sqlx::query_as::<_, MonthlyFeePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM monthly_fee_payments \
             WHERE rw_submission_id = $1 ORDER BY block, house_number"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some((submission, payments)))
    }
}
