//! Prepaid multi-month subscription tracking and monthly release.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Bucket, DeferredSubscription, EntrySource, EntryType, NewLedgerEntry, NewSubscription, Period,
};
use crate::ports::Cache;
use crate::reconcile::breakdown_cache_key;
use crate::store::Store;

/// Creation request, JSON body of `POST /api/deferred-subscription`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub block: Option<String>,
    pub house_number: Option<String>,
    pub total_amount: Option<i64>,
    pub monthly_amount: Option<i64>,
    pub start_month: Option<String>,
    pub end_month: Option<String>,
    pub source_ref: Option<String>,
}

/// Outcome of a monthly release pass over all active subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub processed: usize,
    pub skipped: usize,
}

/// Service for deferred subscriptions.
pub struct DeferredSubscriptions {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
}

impl DeferredSubscriptions {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    /// Validate and create a subscription. `remaining` starts at the full
    /// total and the subscription is active immediately.
    pub async fn create(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<DeferredSubscription, AppError> {
        let block = req
            .block
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::validation("Resident identity is required"))?;
        let house_number = req
            .house_number
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::validation("Resident identity is required"))?;

        let total_amount = req.total_amount.unwrap_or(0);
        if total_amount <= 0 {
            return Err(AppError::validation("totalAmount must be > 0"));
        }
        let monthly_amount = req.monthly_amount.unwrap_or(0);
        if monthly_amount <= 0 {
            return Err(AppError::validation("monthlyAmount must be > 0"));
        }
        if total_amount % monthly_amount != 0 {
            return Err(AppError::validation(
                "totalAmount must be divisible by monthlyAmount",
            ));
        }

        let (Some(start), Some(end)) = (req.start_month, req.end_month) else {
            return Err(AppError::validation("startMonth and endMonth required"));
        };
        let start_month = Period::parse(&start)?;
        let end_month = Period::parse(&end)?;
        if end_month < start_month {
            return Err(AppError::validation("endMonth must not precede startMonth"));
        }

        self.store
            .create_subscription(NewSubscription {
                block,
                house_number,
                total_amount,
                monthly_amount,
                start_month,
                end_month,
                source_ref: req.source_ref,
            })
            .await
    }

    /// Release one month of every eligible active subscription.
    ///
    /// A subscription is skipped when the period falls outside its range
    /// or its remaining credit no longer covers a month. Each release is
    /// one atomic unit: a DEFERRED OUT ledger event plus the decrement.
    pub async fn release_month(&self, period: &Period) -> Result<ReleaseOutcome, AppError> {
        let subs = self.store.list_active_subscriptions().await?;
        let now = Utc::now();

        let mut processed = 0;
        let mut skipped = 0;

        for sub in subs {
            if !sub.covers(period) || sub.remaining < sub.monthly_amount {
                skipped += 1;
                continue;
            }

            let event = NewLedgerEntry {
                entry_type: EntryType::Out,
                amount: sub.monthly_amount,
                bucket: Bucket::Deferred,
                description: format!(
                    "Iuran {} - Blok {} No {}",
                    period.month_label(),
                    sub.block,
                    sub.house_number
                ),
                date: now,
                source: EntrySource::MonthlyFee,
                source_ref: Some(sub.id.to_string()),
                created_by: "cron".to_string(),
            };

            match self.store.release_subscription(sub.id, event).await? {
                Some(updated) => {
                    info!(
                        subscription_id = %updated.id,
                        remaining = updated.remaining,
                        "released deferred month {}",
                        period
                    );
                    processed += 1;
                }
                None => skipped += 1,
            }
        }

        if processed > 0 {
            // Released months change the breakdown view for this period.
            let cache = Arc::clone(&self.cache);
            let key = breakdown_cache_key(period);
            tokio::spawn(async move { cache.del(&key).await });
        }

        Ok(ReleaseOutcome { processed, skipped })
    }

    /// Whether an active subscription for this resident covers the period.
    pub async fn is_covering_period(
        &self,
        block: &str,
        house_number: &str,
        period: &Period,
    ) -> Result<bool, AppError> {
        Ok(self
            .store
            .find_active_subscription(block, house_number)
            .await?
            .map(|sub| sub.covers(period))
            .unwrap_or(false))
    }

    /// Manual override for exception handling; ignores remaining credit.
    pub async fn deactivate(&self, id: Uuid) -> Result<DeferredSubscription, AppError> {
        warn!(subscription_id = %id, "manual deactivation");
        self.store.deactivate_subscription(id).await
    }

    pub async fn list(&self) -> Result<Vec<DeferredSubscription>, AppError> {
        self.store.list_subscriptions().await
    }

    pub async fn list_active(&self) -> Result<Vec<DeferredSubscription>, AppError> {
        self.store.list_active_subscriptions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerEntry;
    use crate::ports::memory::MemoryCache;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, DeferredSubscriptions) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let service = DeferredSubscriptions::new(store.clone(), cache);
        (store, service)
    }

    fn request() -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            block: Some("B1".to_string()),
            house_number: Some("11".to_string()),
            total_amount: Some(90_000),
            monthly_amount: Some(30_000),
            start_month: Some("2025-01".to_string()),
            end_month: Some("2025-03".to_string()),
            source_ref: None,
        }
    }

    #[tokio::test]
    async fn create_initializes_remaining_and_active() {
        let (_, service) = service();
        let sub = service.create(request()).await.unwrap();
        assert_eq!(sub.remaining, 90_000);
        assert!(sub.is_active);
    }

    #[tokio::test]
    async fn create_rejects_uneven_division() {
        let (_, service) = service();
        let err = service
            .create(CreateSubscriptionRequest {
                total_amount: Some(100_000),
                monthly_amount: Some(30_000),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_requires_month_range() {
        let (_, service) = service();
        let err = service
            .create(CreateSubscriptionRequest {
                end_month: None,
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn three_releases_exhaust_the_subscription() {
        let (store, service) = service();
        let sub = service.create(request()).await.unwrap();

        for (period, expected_remaining) in
            [("2025-01", 60_000), ("2025-02", 30_000), ("2025-03", 0)]
        {
            let outcome = service
                .release_month(&Period::parse(period).unwrap())
                .await
                .unwrap();
            assert_eq!(outcome.processed, 1, "period {period}");
            let current = service
                .list()
                .await
                .unwrap()
                .into_iter()
                .find(|s| s.id == sub.id)
                .unwrap();
            assert_eq!(current.remaining, expected_remaining);
        }

        let exhausted = service.list().await.unwrap().remove(0);
        assert!(!exhausted.is_active);

        // Fourth release: subscription is inactive, nothing happens.
        let outcome = service
            .release_month(&Period::parse("2025-03").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.processed, 0);

        // Exactly three DEFERRED event entries, none carrying a balance.
        let events: Vec<LedgerEntry> = store
            .list_ledger_entries()
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.bucket == Bucket::Deferred)
            .collect();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.balance.is_none()));
        assert!(events
            .iter()
            .all(|e| e.source_ref.as_deref() == Some(sub.id.to_string().as_str())));
    }

    #[tokio::test]
    async fn out_of_range_period_is_skipped() {
        let (_, service) = service();
        service.create(request()).await.unwrap();
        let outcome = service
            .release_month(&Period::parse("2024-12").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn covering_check_respects_range_and_activity() {
        let (_, service) = service();
        let sub = service.create(request()).await.unwrap();
        let jan = Period::parse("2025-01").unwrap();

        assert!(service.is_covering_period("B1", "11", &jan).await.unwrap());
        assert!(!service
            .is_covering_period("B1", "11", &Period::parse("2025-04").unwrap())
            .await
            .unwrap());
        assert!(!service.is_covering_period("B2", "11", &jan).await.unwrap());

        service.deactivate(sub.id).await.unwrap();
        assert!(!service.is_covering_period("B1", "11", &jan).await.unwrap());
    }
}
