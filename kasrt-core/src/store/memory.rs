//! Mutex-guarded in-memory store.
//!
//! Backs tests and local development. Each trait method takes the single
//! lock for its whole body, which makes every method — including the
//! ledger appends and the deferred release — an atomic unit.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{codes, AppError};
use crate::ledger::next_cash_balance;
use crate::models::{
    Bucket, DeferredSubscription, LedgerEntry, MonthlyFeePayment, NewLedgerEntry, NewPayment,
    NewSubscription, PaymentStatus, Period, Resident, RwSubmission, SubmissionSummary, User,
};

use super::Store;

#[derive(Default)]
struct Inner {
    residents: Vec<Resident>,
    users: Vec<User>,
    payments: Vec<MonthlyFeePayment>,
    subscriptions: Vec<DeferredSubscription>,
    /// Insertion order doubles as creation order for the ledger.
    ledger: Vec<LedgerEntry>,
    submissions: Vec<RwSubmission>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed helper for tests and local development.
    pub fn add_resident(&self, block: &str, house_number: &str, full_name: &str) -> Resident {
        let mut inner = self.lock();
        let resident = Resident {
            id: inner.residents.len() as i64 + 1,
            block: block.to_string(),
            house_number: house_number.to_string(),
            full_name: full_name.to_string(),
        };
        inner.residents.push(resident.clone());
        resident
    }

    /// Seed helper; hashes the password with bcrypt.
    pub fn add_user(&self, email: &str, password: &str, name: &str, role: &str) -> Result<User, AppError> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::Store(e.to_string()))?;
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            name: name.to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
        };
        self.lock().users.push(user.clone());
        Ok(user)
    }

    fn append_one(inner: &mut Inner, new: NewLedgerEntry) -> Result<LedgerEntry, AppError> {
        let balance = match new.bucket {
            Bucket::Cash => {
                let last = inner
                    .ledger
                    .iter()
                    .rev()
                    .find(|e| e.bucket == Bucket::Cash)
                    .and_then(|e| e.balance.map(|b| (b, e.date)));
                Some(next_cash_balance(last, new.date, new.entry_type, new.amount)?)
            }
            Bucket::Deferred => None,
        };

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            entry_type: new.entry_type,
            amount: new.amount,
            bucket: new.bucket,
            balance,
            description: new.description,
            date: new.date,
            source: new.source,
            source_ref: new.source_ref,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        inner.ledger.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn list_residents(&self) -> Result<Vec<Resident>, AppError> {
        let mut residents = self.lock().residents.clone();
        residents.sort_by_key(|r| r.id);
        Ok(residents)
    }

    async fn find_resident(
        &self,
        block: &str,
        house_number: &str,
    ) -> Result<Option<Resident>, AppError> {
        Ok(self
            .lock()
            .residents
            .iter()
            .find(|r| r.block == block && r.house_number == house_number)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_payment(&self, new: NewPayment) -> Result<MonthlyFeePayment, AppError> {
        let mut inner = self.lock();
        let duplicate = inner.payments.iter().any(|p| {
            p.block == new.block && p.house_number == new.house_number && p.period == new.period
        });
        if duplicate {
            return Err(AppError::conflict(
                codes::ALREADY_SUBMITTED,
                "Monthly fee for this house and month has already been submitted",
            ));
        }

        let payment = MonthlyFeePayment {
            id: Uuid::new_v4(),
            block: new.block,
            house_number: new.house_number,
            period: new.period,
            full_name: new.full_name,
            amount: new.amount,
            status: new.status,
            raw_text: new.raw_text,
            image_url: new.image_url,
            notes: new.notes,
            attempt: 0,
            error_message: None,
            rw_submission_id: None,
            created_at: Utc::now(),
        };
        inner.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<MonthlyFeePayment>, AppError> {
        Ok(self.lock().payments.iter().find(|p| p.id == id).cloned())
    }

    async fn find_payment(
        &self,
        block: &str,
        house_number: &str,
        period: &Period,
    ) -> Result<Option<MonthlyFeePayment>, AppError> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.block == block && p.house_number == house_number && p.period == *period)
            .cloned())
    }

    async fn pending_payments(&self, limit: usize) -> Result<Vec<MonthlyFeePayment>, AppError> {
        Ok(self
            .lock()
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_payment_processing(&self, id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock();
        let payment = inner
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(AppError::NotFound)?;
        payment.status = PaymentStatus::Processing;
        Ok(())
    }

    async fn record_ocr_result(
        &self,
        id: Uuid,
        raw_text: &str,
        amount: Option<i64>,
        status: PaymentStatus,
    ) -> Result<MonthlyFeePayment, AppError> {
        let mut inner = self.lock();
        let payment = inner
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(AppError::NotFound)?;
        payment.raw_text = Some(raw_text.to_string());
        if amount.is_some() {
            payment.amount = amount;
        }
        payment.status = status;
        payment.attempt += 1;
        Ok(payment.clone())
    }

    async fn record_ocr_failure(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        let payment = inner
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(AppError::NotFound)?;
        payment.status = PaymentStatus::Failed;
        payment.error_message = Some(error.to_string());
        payment.attempt += 1;
        Ok(())
    }

    async fn review_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        amount: Option<i64>,
        notes: Option<String>,
    ) -> Result<MonthlyFeePayment, AppError> {
        let mut inner = self.lock();
        let payment = inner
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(AppError::NotFound)?;
        payment.status = status;
        if amount.is_some() {
            payment.amount = amount;
        }
        if notes.is_some() {
            payment.notes = notes;
        }
        Ok(payment.clone())
    }

    async fn completed_payments(
        &self,
        period: &Period,
    ) -> Result<Vec<MonthlyFeePayment>, AppError> {
        Ok(self
            .lock()
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed && p.period == *period)
            .cloned()
            .collect())
    }

    async fn unsubmitted_payments(
        &self,
        period: Option<&Period>,
    ) -> Result<Vec<MonthlyFeePayment>, AppError> {
        let mut payments: Vec<MonthlyFeePayment> = self
            .lock()
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed && p.rw_submission_id.is_none())
            .filter(|p| period.map(|wanted| p.period == *wanted).unwrap_or(true))
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            (a.period.clone(), a.block.clone(), a.house_number.clone()).cmp(&(
                b.period.clone(),
                b.block.clone(),
                b.house_number.clone(),
            ))
        });
        Ok(payments)
    }

    async fn payments_awaiting_submission(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<MonthlyFeePayment>, AppError> {
        Ok(self
            .lock()
            .payments
            .iter()
            .filter(|p| {
                ids.contains(&p.id)
                    && p.status == PaymentStatus::Completed
                    && p.rw_submission_id.is_none()
            })
            .cloned()
            .collect())
    }

    async fn create_subscription(
        &self,
        new: NewSubscription,
    ) -> Result<DeferredSubscription, AppError> {
        let subscription = DeferredSubscription {
            id: Uuid::new_v4(),
            block: new.block,
            house_number: new.house_number,
            total_amount: new.total_amount,
            monthly_amount: new.monthly_amount,
            remaining: new.total_amount,
            start_month: new.start_month,
            end_month: new.end_month,
            is_active: true,
            source_ref: new.source_ref,
            created_at: Utc::now(),
        };
        self.lock().subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn list_subscriptions(&self) -> Result<Vec<DeferredSubscription>, AppError> {
        Ok(self.lock().subscriptions.clone())
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<DeferredSubscription>, AppError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn find_active_subscription(
        &self,
        block: &str,
        house_number: &str,
    ) -> Result<Option<DeferredSubscription>, AppError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .find(|s| s.is_active && s.block == block && s.house_number == house_number)
            .cloned())
    }

    async fn deactivate_subscription(&self, id: Uuid) -> Result<DeferredSubscription, AppError> {
        let mut inner = self.lock();
        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(AppError::NotFound)?;
        sub.is_active = false;
        Ok(sub.clone())
    }

    async fn release_subscription(
        &self,
        id: Uuid,
        event: NewLedgerEntry,
    ) -> Result<Option<DeferredSubscription>, AppError> {
        let mut inner = self.lock();

        let (remaining, monthly_amount) = {
            let sub = inner
                .subscriptions
                .iter()
                .find(|s| s.id == id)
                .ok_or(AppError::NotFound)?;
            if !sub.is_active || sub.remaining < sub.monthly_amount {
                return Ok(None);
            }
            (sub.remaining, sub.monthly_amount)
        };

        Self::append_one(&mut inner, event)?;

        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(AppError::NotFound)?;
        sub.remaining = remaining - monthly_amount;
        sub.is_active = sub.remaining > 0;
        Ok(Some(sub.clone()))
    }

    async fn append_ledger_entry(&self, new: NewLedgerEntry) -> Result<LedgerEntry, AppError> {
        let mut inner = self.lock();
        Self::append_one(&mut inner, new)
    }

    async fn append_ledger_entries(
        &self,
        batch: Vec<NewLedgerEntry>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let mut inner = self.lock();
        let checkpoint = inner.ledger.len();

        let mut inserted = Vec::with_capacity(batch.len());
        for new in batch {
            match Self::append_one(&mut inner, new) {
                Ok(entry) => inserted.push(entry),
                Err(err) => {
                    // No partial commit: roll the vector back.
                    inner.ledger.truncate(checkpoint);
                    return Err(err);
                }
            }
        }
        Ok(inserted)
    }

    async fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>, AppError> {
        let mut entries = self.lock().ledger.clone();
        entries.reverse();
        Ok(entries)
    }

    async fn latest_cash_balance(&self) -> Result<i64, AppError> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .rev()
            .find(|e| e.bucket == Bucket::Cash)
            .and_then(|e| e.balance)
            .unwrap_or(0))
    }

    async fn create_submission(
        &self,
        period: Period,
        total_amount: i64,
        notes: Option<String>,
        payment_ids: &[Uuid],
    ) -> Result<RwSubmission, AppError> {
        let mut inner = self.lock();
        let submission = RwSubmission {
            id: Uuid::new_v4(),
            period,
            total_amount,
            submitted_at: Utc::now(),
            notes,
        };
        for payment in inner.payments.iter_mut() {
            if payment_ids.contains(&payment.id)
                && payment.status == PaymentStatus::Completed
                && payment.rw_submission_id.is_none()
            {
                payment.rw_submission_id = Some(submission.id);
            }
        }
        inner.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn list_submissions(
        &self,
        period_prefix: Option<&str>,
    ) -> Result<Vec<SubmissionSummary>, AppError> {
        let inner = self.lock();
        let mut summaries: Vec<SubmissionSummary> = inner
            .submissions
            .iter()
            .filter(|s| {
                period_prefix
                    .map(|prefix| s.period.as_str().starts_with(prefix))
                    .unwrap_or(true)
            })
            .map(|s| SubmissionSummary {
                id: s.id,
                period: s.period.clone(),
                total_amount: s.total_amount,
                submitted_at: s.submitted_at,
                notes: s.notes.clone(),
                record_count: inner
                    .payments
                    .iter()
                    .filter(|p| p.rw_submission_id == Some(s.id))
                    .count() as i64,
            })
            .collect();
        summaries.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(summaries)
    }

    async fn get_submission(
        &self,
        id: Uuid,
    ) -> Result<Option<(RwSubmission, Vec<MonthlyFeePayment>)>, AppError> {
        let inner = self.lock();
        let Some(submission) = inner.submissions.iter().find(|s| s.id == id).cloned() else {
            return Ok(None);
        };
        let mut payments: Vec<MonthlyFeePayment> = inner
            .payments
            .iter()
            .filter(|p| p.rw_submission_id == Some(id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            (a.block.clone(), a.house_number.clone()).cmp(&(b.block.clone(), b.house_number.clone()))
        });
        Ok(Some((submission, payments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(block: &str, house: &str, period: &str) -> NewPayment {
        NewPayment {
            block: block.to_string(),
            house_number: house.to_string(),
            period: Period::parse(period).unwrap(),
            full_name: "Tester".to_string(),
            amount: Some(210_000),
            status: PaymentStatus::Pending,
            raw_text: None,
            image_url: "memory://proof".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn duplicate_payment_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_payment(payment("B1", "11", "2025-01")).await.unwrap();
        let err = store
            .create_payment(payment("B1", "11", "2025-01"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict { code, .. } if code == codes::ALREADY_SUBMITTED
        ));
        // Same house, different month is fine.
        store.create_payment(payment("B1", "11", "2025-02")).await.unwrap();
    }

    #[tokio::test]
    async fn seeded_user_can_be_looked_up_and_verified() {
        let store = MemoryStore::new();
        store
            .add_user("bendahara@rt.local", "rahasia", "Bu Bendahara", "bendahara")
            .unwrap();

        let user = store
            .find_user_by_email("bendahara@rt.local")
            .await
            .unwrap()
            .unwrap();
        assert!(bcrypt::verify("rahasia", &user.password_hash).unwrap());
        assert!(store.find_user_by_email("nobody@rt.local").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_payments_come_back_oldest_first() {
        let store = MemoryStore::new();
        let first = store.create_payment(payment("B1", "1", "2025-01")).await.unwrap();
        let second = store.create_payment(payment("B1", "2", "2025-01")).await.unwrap();
        store.create_payment(payment("B1", "3", "2025-01")).await.unwrap();

        let page = store.pending_payments(2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, first.id);
        assert_eq!(page[1].id, second.id);
    }
}
