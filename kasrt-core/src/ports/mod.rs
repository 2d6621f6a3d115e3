//! Capability ports for external collaborators.
//!
//! Image storage, OCR, the cache and the approval channel are opaque
//! interfaces here; the reconciliation logic never talks to a concrete
//! vendor. In-process implementations live in [`memory`].

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppError;
use crate::models::MonthlyFeePayment;

/// Durable image storage (proof photos).
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Upload image bytes, returning a durable URL.
    async fn upload(&self, bytes: &[u8]) -> Result<String, AppError>;

    /// Fetch the bytes back for server-side OCR.
    async fn download(&self, url: &str) -> Result<Vec<u8>, AppError>;
}

/// Text recognition over an image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, AppError>;
}

/// Key-value cache with per-key TTL.
///
/// All methods are infallible from the caller's point of view; cache
/// failures are logged by the implementation and must never fail the
/// primary request.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    async fn del(&self, key: &str);
}

/// Channel used to ask a human to approve or type in an amount.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_approval_request(&self, payment: &MonthlyFeePayment) -> Result<(), AppError>;
    async fn send_manual_input_request(&self, payment: &MonthlyFeePayment)
        -> Result<(), AppError>;
}
