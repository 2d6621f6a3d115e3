//! Shared application state for the server and worker binaries.

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::deferred::DeferredSubscriptions;
use crate::ledger::CashLedger;
use crate::ports::memory::{LogNotifier, MemoryCache, MemoryImageStore, TextOcr};
use crate::ports::{Cache, ImageStore, Notifier, OcrEngine};
use crate::reconcile::Reconciler;
use crate::store::{MemoryStore, PgStore, Store};
use crate::submission::Submissions;

/// Everything route handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub reconciler: Arc<Reconciler>,
    pub ledger: Arc<CashLedger>,
    pub deferred: Arc<DeferredSubscriptions>,
    pub submissions: Arc<Submissions>,
}

impl AppState {
    /// Wire the services over the given store and ports.
    pub fn assemble(
        config: Config,
        store: Arc<dyn Store>,
        image_store: Arc<dyn ImageStore>,
        ocr: Arc<dyn OcrEngine>,
        cache: Arc<dyn Cache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            image_store,
            ocr,
            Arc::clone(&cache),
            notifier,
        ));
        let ledger = Arc::new(CashLedger::new(Arc::clone(&store)));
        let deferred = Arc::new(DeferredSubscriptions::new(
            Arc::clone(&store),
            Arc::clone(&cache),
        ));
        let submissions = Arc::new(Submissions::new(Arc::clone(&store)));

        AppState {
            config: Arc::new(config),
            store,
            cache,
            reconciler,
            ledger,
            deferred,
            submissions,
        }
    }

    /// Build the state from configuration: Postgres when `DATABASE_URL`
    /// is set, the in-memory store otherwise. The external ports use the
    /// in-process implementations.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pool = db::create_pool(url).await?;
                info!("connected to Postgres");
                Arc::new(PgStore::new(pool))
            }
            None => {
                info!("DATABASE_URL not set, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::assemble(
            config,
            store,
            Arc::new(MemoryImageStore::new()),
            Arc::new(TextOcr::new()),
            Arc::new(MemoryCache::new()),
            Arc::new(LogNotifier::new()),
        ))
    }
}
