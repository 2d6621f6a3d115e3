//! Router assembly.

pub mod auth;
pub mod cash_ledger;
pub mod cron;
pub mod deferred;
pub mod monthly_fee;
pub mod residents;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kasrt-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Storage connectivity probe.
async fn db_health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    state.store.ping().await.map_err(|e| {
        tracing::error!("store health check failed: {e}");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "store": "connected"
    })))
}

pub fn create_router(state: AppState) -> Router {
    // Treasurer-facing surface, behind the JWT middleware.
    let protected = Router::new()
        .route("/residents", get(residents::list))
        .route(
            "/cash-ledger",
            post(cash_ledger::post_entry).get(cash_ledger::list),
        )
        .route("/cash-ledger/balance", get(cash_ledger::balance))
        .route("/cash-ledger/import-csv", post(cash_ledger::import_csv))
        .route(
            "/deferred-subscription",
            post(deferred::create).get(deferred::list),
        )
        .route("/deferred-subscription/active", get(deferred::list_active))
        .route(
            "/deferred-subscription/:id/deactivate",
            patch(deferred::deactivate),
        )
        .route("/monthly-fee/:id/approve", post(monthly_fee::approve))
        .route("/monthly-fee/:id/reject", post(monthly_fee::reject))
        .route(
            "/monthly-fee/:id/manual-amount",
            post(monthly_fee::manual_amount),
        )
        .route(
            "/monthly-fee/pending-submission",
            get(monthly_fee::pending_submission),
        )
        .route("/monthly-fee/submit-to-rw", post(monthly_fee::submit_to_rw))
        .route(
            "/monthly-fee/rw-submissions",
            get(monthly_fee::list_submissions),
        )
        .route(
            "/monthly-fee/rw-submissions/:id",
            get(monthly_fee::submission_detail),
        )
        .route("/auth/validate", get(auth::validate))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Resident-facing submission surface plus the cron hooks; the cron
    // handlers check the shared secret themselves.
    let public = Router::new()
        .route("/login", post(auth::login))
        .route("/monthly-fee", post(monthly_fee::submit_with_proof))
        .route("/monthly-fee-manual", post(monthly_fee::submit_manual))
        .route("/monthly-fee-validate", get(monthly_fee::validate))
        .route(
            "/monthly-fee/breakdown/:year/:month",
            get(monthly_fee::breakdown_view),
        )
        .route("/blocks", get(residents::blocks))
        .route("/block-houses", get(residents::block_houses))
        .route("/cron/run-ocr", post(cron::run_ocr))
        .route("/cron/release-deferred/:period", post(cron::release_deferred));

    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(db_health))
        .nest("/api", public.merge(protected))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
