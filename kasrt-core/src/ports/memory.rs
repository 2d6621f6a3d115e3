//! In-process port implementations.
//!
//! These stand in for Cloudinary / Tesseract / Redis / Telegram in tests
//! and local development. In production deployments each would be
//! replaced by a real client behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::MonthlyFeePayment;

use super::{Cache, ImageStore, Notifier, OcrEngine};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Image store keeping uploads in a map keyed by generated URL.
#[derive(Default)]
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, bytes: &[u8]) -> Result<String, AppError> {
        let url = format!("memory://images/{}", Uuid::new_v4());
        lock(&self.objects).insert(url.clone(), bytes.to_vec());
        Ok(url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, AppError> {
        lock(&self.objects)
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::External(format!("image not found: {url}")))
    }
}

/// OCR engine that treats the image bytes as UTF-8 text.
///
/// Lets the whole pipeline run end to end without a vision model: feed a
/// receipt's text as the "image" and extraction behaves exactly as it
/// would against real OCR output.
#[derive(Default)]
pub struct TextOcr;

impl TextOcr {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OcrEngine for TextOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String, AppError> {
        Ok(String::from_utf8_lossy(image).into_owned())
    }
}

/// In-memory cache with lazy expiry on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        lock(&self.entries).insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn del(&self, key: &str) {
        lock(&self.entries).remove(key);
    }
}

/// Notifier that only logs.
///
/// Production wires the treasurer's Telegram group here; the message
/// content mirrors what that bot sends.
#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_approval_request(&self, payment: &MonthlyFeePayment) -> Result<(), AppError> {
        info!(
            payment_id = %payment.id,
            amount = ?payment.amount,
            "approval request: Blok {} No {} {}",
            payment.block,
            payment.house_number,
            payment.period
        );
        Ok(())
    }

    async fn send_manual_input_request(
        &self,
        payment: &MonthlyFeePayment,
    ) -> Result<(), AppError> {
        info!(
            payment_id = %payment.id,
            "manual input request: Blok {} No {} {}",
            payment.block,
            payment.house_number,
            payment.period
        );
        Ok(())
    }
}

/// Notifier that records every request, for assertions in tests.
#[derive(Default)]
pub struct RecordingNotifier {
    pub approvals: Mutex<Vec<Uuid>>,
    pub manual_inputs: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_approval_request(&self, payment: &MonthlyFeePayment) -> Result<(), AppError> {
        lock(&self.approvals).push(payment.id);
        Ok(())
    }

    async fn send_manual_input_request(
        &self,
        payment: &MonthlyFeePayment,
    ) -> Result<(), AppError> {
        lock(&self.manual_inputs).push(payment.id);
        Ok(())
    }
}
