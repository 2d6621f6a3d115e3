use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info};

use crate::reconcile::Reconciler;

/// Polling scheduler for the OCR batch.
///
/// Runs the same batch as `POST /api/cron/run-ocr`, so deployments can
/// pick either the worker binary or an external cron without behavioral
/// difference.
pub struct OcrScheduler {
    reconciler: Arc<Reconciler>,
    poll_interval_seconds: u64,
    batch_size: usize,
    running: Arc<RwLock<bool>>,
}

impl OcrScheduler {
    pub fn new(reconciler: Arc<Reconciler>, poll_interval_seconds: u64, batch_size: usize) -> Self {
        Self {
            reconciler,
            poll_interval_seconds,
            batch_size,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run the polling loop until [`stop`](Self::stop) is called.
    ///
    /// A failing batch is logged and the loop keeps going.
    pub async fn start(&self) {
        *self.running.write().await = true;
        info!(
            "OcrScheduler started, poll interval {}s, batch size {}",
            self.poll_interval_seconds, self.batch_size
        );

        while *self.running.read().await {
            match self.reconciler.run_batch_ocr(self.batch_size).await {
                Ok(0) => {}
                Ok(count) => info!("processed {count} OCR job(s)"),
                Err(e) => error!("OCR batch failed: {e}"),
            }

            sleep(Duration::from_secs(self.poll_interval_seconds)).await;
        }

        info!("OcrScheduler stopped");
    }

    /// Let the loop exit after the current iteration.
    pub async fn stop(&self) {
        info!("stopping OcrScheduler");
        *self.running.write().await = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPayment, PaymentStatus, Period};
    use crate::ports::memory::{LogNotifier, MemoryCache, MemoryImageStore, TextOcr};
    use crate::ports::ImageStore;
    use crate::store::{MemoryStore, Store};

    #[tokio::test]
    async fn scheduler_drains_the_pending_queue() {
        let store = Arc::new(MemoryStore::new());
        let image_store = Arc::new(MemoryImageStore::new());
        let url = image_store.upload(b"Rp 210.000").await.unwrap();
        store
            .create_payment(NewPayment {
                block: "B1".to_string(),
                house_number: "1".to_string(),
                period: Period::parse("2025-01").unwrap(),
                full_name: "Tester".to_string(),
                amount: None,
                status: PaymentStatus::Pending,
                raw_text: None,
                image_url: url,
                notes: None,
            })
            .await
            .unwrap();

        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            image_store,
            Arc::new(TextOcr::new()),
            Arc::new(MemoryCache::new()),
            Arc::new(LogNotifier::new()),
        ));

        let scheduler = Arc::new(OcrScheduler::new(reconciler, 1, 3));
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.start().await })
        };

        // One iteration is enough to drain a single job.
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;
        let _ = handle.await;

        assert!(store.pending_payments(10).await.unwrap().is_empty());
    }
}
