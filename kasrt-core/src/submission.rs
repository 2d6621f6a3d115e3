//! Forwarding collected monthly fees to the RW treasurer.
//!
//! COMPLETED payments accumulate until the RT treasurer bundles them into
//! an `RwSubmission`; linked payments drop out of the pending queue.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{MonthlyFeePayment, Period, RwSubmission, SubmissionSummary};
use crate::store::Store;

/// JSON body of `POST /api/monthly-fee/submit-to-rw`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitToRwRequest {
    pub period: String,
    pub payment_ids: Vec<Uuid>,
    pub notes: Option<String>,
}

/// One group of the pending view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingGroup {
    pub count: usize,
    pub total_amount: i64,
    pub payments: Vec<MonthlyFeePayment>,
}

impl PendingGroup {
    fn from(payments: Vec<MonthlyFeePayment>) -> Self {
        let total_amount = payments.iter().filter_map(|p| p.amount).sum();
        PendingGroup {
            count: payments.len(),
            total_amount,
            payments,
        }
    }
}

/// COMPLETED-but-unforwarded payments, split against the current month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub current_period: Period,
    pub on_time: PendingGroup,
    pub late: PendingGroup,
}

/// One fee row of the submission detail view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRow {
    #[serde(flatten)]
    pub payment: MonthlyFeePayment,
    /// The fee was for a month other than the one submitted.
    pub is_late: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDetail {
    pub submission: RwSubmission,
    pub payments: Vec<SubmissionRow>,
}

pub struct Submissions {
    store: Arc<dyn Store>,
}

impl Submissions {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// COMPLETED payments not yet linked to a submission. Payments for the
    /// current month count as on time, older months as late.
    pub async fn pending(&self, period: Option<&Period>) -> Result<PendingSubmission, AppError> {
        let current = Period::current();
        let payments = self.store.unsubmitted_payments(period).await?;

        let (on_time, late): (Vec<_>, Vec<_>) =
            payments.into_iter().partition(|p| p.period >= current);

        Ok(PendingSubmission {
            current_period: current,
            on_time: PendingGroup::from(on_time),
            late: PendingGroup::from(late),
        })
    }

    /// Bundle the given payments into one submission for `period`.
    ///
    /// Every id must still be COMPLETED and unlinked; anything else fails
    /// the whole request so a double-submitted bundle cannot silently
    /// shrink.
    pub async fn submit_to_rw(&self, req: SubmitToRwRequest) -> Result<RwSubmission, AppError> {
        let period = Period::parse(&req.period)?;
        if req.payment_ids.is_empty() {
            return Err(AppError::validation("paymentIds must not be empty"));
        }

        let eligible = self
            .store
            .payments_awaiting_submission(&req.payment_ids)
            .await?;
        if eligible.len() != req.payment_ids.len() {
            return Err(AppError::validation(
                "Some payments are not completed or were already submitted",
            ));
        }

        let mut total_amount = 0i64;
        for payment in &eligible {
            let amount = payment.amount.ok_or_else(|| {
                AppError::validation(format!("Payment {} has no amount", payment.id))
            })?;
            total_amount += amount;
        }

        let ids: Vec<Uuid> = eligible.iter().map(|p| p.id).collect();
        let submission = self
            .store
            .create_submission(period, total_amount, req.notes, &ids)
            .await?;

        info!(
            submission_id = %submission.id,
            total_amount,
            records = ids.len(),
            "submitted to RW for {}",
            submission.period
        );
        Ok(submission)
    }

    pub async fn list(
        &self,
        period_prefix: Option<&str>,
    ) -> Result<Vec<SubmissionSummary>, AppError> {
        self.store.list_submissions(period_prefix).await
    }

    pub async fn detail(&self, id: Uuid) -> Result<SubmissionDetail, AppError> {
        let (submission, payments) = self
            .store
            .get_submission(id)
            .await?
            .ok_or(AppError::NotFound)?;

        let payments = payments
            .into_iter()
            .map(|payment| SubmissionRow {
                is_late: payment.period != submission.period,
                payment,
            })
            .collect();

        Ok(SubmissionDetail {
            submission,
            payments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPayment, PaymentStatus};
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, Submissions) {
        let store = Arc::new(MemoryStore::new());
        let service = Submissions::new(store.clone());
        (store, service)
    }

    async fn completed_payment(
        store: &MemoryStore,
        house: &str,
        period: &str,
        amount: i64,
    ) -> MonthlyFeePayment {
        let created = store
            .create_payment(NewPayment {
                block: "B1".to_string(),
                house_number: house.to_string(),
                period: Period::parse(period).unwrap(),
                full_name: "Tester".to_string(),
                amount: Some(amount),
                status: PaymentStatus::WaitingApproval,
                raw_text: None,
                image_url: "memory://proof".to_string(),
                notes: None,
            })
            .await
            .unwrap();
        store
            .review_payment(created.id, PaymentStatus::Completed, None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pending_splits_late_from_on_time() {
        let (store, service) = service();
        let current = Period::current();
        completed_payment(&store, "1", current.as_str(), 210_000).await;
        completed_payment(&store, "2", "2020-01", 186_000).await;

        let pending = service.pending(None).await.unwrap();
        assert_eq!(pending.on_time.count, 1);
        assert_eq!(pending.on_time.total_amount, 210_000);
        assert_eq!(pending.late.count, 1);
        assert_eq!(pending.late.total_amount, 186_000);
    }

    #[tokio::test]
    async fn pending_excludes_non_completed_and_linked() {
        let (store, service) = service();
        // Still waiting for approval; must not appear.
        store
            .create_payment(NewPayment {
                block: "B1".to_string(),
                house_number: "9".to_string(),
                period: Period::parse("2020-01").unwrap(),
                full_name: "Tester".to_string(),
                amount: Some(210_000),
                status: PaymentStatus::WaitingApproval,
                raw_text: None,
                image_url: "memory://proof".to_string(),
                notes: None,
            })
            .await
            .unwrap();
        let done = completed_payment(&store, "1", "2020-01", 210_000).await;

        let pending = service.pending(None).await.unwrap();
        assert_eq!(pending.late.count, 1);

        service
            .submit_to_rw(SubmitToRwRequest {
                period: "2020-01".to_string(),
                payment_ids: vec![done.id],
                notes: None,
            })
            .await
            .unwrap();

        let pending = service.pending(None).await.unwrap();
        assert_eq!(pending.late.count, 0);
        assert_eq!(pending.on_time.count, 0);
    }

    #[tokio::test]
    async fn submit_totals_and_links_payments() {
        let (store, service) = service();
        let a = completed_payment(&store, "1", "2025-01", 210_000).await;
        let b = completed_payment(&store, "2", "2025-01", 186_000).await;

        let submission = service
            .submit_to_rw(SubmitToRwRequest {
                period: "2025-01".to_string(),
                payment_ids: vec![a.id, b.id],
                notes: Some("Januari".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(submission.total_amount, 396_000);

        let summaries = service.list(Some("2025")).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].record_count, 2);

        // The same ids cannot go into a second bundle.
        let err = service
            .submit_to_rw(SubmitToRwRequest {
                period: "2025-01".to_string(),
                payment_ids: vec![a.id],
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn detail_flags_late_rows() {
        let (store, service) = service();
        let on_time = completed_payment(&store, "1", "2025-02", 210_000).await;
        let late = completed_payment(&store, "2", "2025-01", 210_000).await;

        let submission = service
            .submit_to_rw(SubmitToRwRequest {
                period: "2025-02".to_string(),
                payment_ids: vec![on_time.id, late.id],
                notes: None,
            })
            .await
            .unwrap();

        let detail = service.detail(submission.id).await.unwrap();
        assert_eq!(detail.payments.len(), 2);
        for row in &detail.payments {
            if row.payment.id == late.id {
                assert!(row.is_late);
            } else {
                assert!(!row.is_late);
            }
        }

        assert!(matches!(
            service.detail(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound
        ));
    }
}
