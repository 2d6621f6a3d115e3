//! Cash-ledger bookkeeping: running-balance rules, entry posting and the
//! bulk CSV import.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use std::sync::Arc;

use crate::error::{codes, AppError};
use crate::models::{Bucket, EntrySource, EntryType, LedgerEntry, NewLedgerEntry};
use crate::store::Store;

/// Compute the balance a new CASH entry would carry, given the latest
/// existing CASH entry (balance, date).
///
/// Both store backends call this inside their atomic append sections so
/// the rules live in exactly one place: no backdating past the latest
/// entry, and the running balance must never go negative.
pub fn next_cash_balance(
    last: Option<(i64, DateTime<Utc>)>,
    date: DateTime<Utc>,
    entry_type: EntryType,
    amount: i64,
) -> Result<i64, AppError> {
    if let Some((_, last_date)) = last {
        if date < last_date {
            return Err(AppError::conflict(
                codes::BACKDATED_ENTRY,
                "Backdated transaction is not allowed",
            ));
        }
    }

    let prior = last.map(|(balance, _)| balance).unwrap_or(0);
    let next = match entry_type {
        EntryType::In => prior + amount,
        EntryType::Out => prior - amount,
    };

    if next < 0 {
        return Err(AppError::conflict(
            codes::INSUFFICIENT_BALANCE,
            "Saldo kas tidak mencukupi",
        ));
    }

    Ok(next)
}

/// Request body for posting a single ledger entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEntryRequest {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: i64,
    pub description: String,
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bucket: Option<Bucket>,
    #[serde(default)]
    pub source: Option<EntrySource>,
    pub source_ref: Option<String>,
}

/// Service wrapping ledger reads and writes over the store.
pub struct CashLedger {
    store: Arc<dyn Store>,
}

impl CashLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validate and post one entry as a single atomic unit.
    pub async fn post_entry(
        &self,
        req: PostEntryRequest,
        created_by: &str,
    ) -> Result<LedgerEntry, AppError> {
        if req.amount <= 0 {
            return Err(AppError::validation("Amount must be greater than 0"));
        }
        if req.description.trim().is_empty() {
            return Err(AppError::validation("Description is required"));
        }

        let entry = NewLedgerEntry {
            entry_type: req.entry_type,
            amount: req.amount,
            bucket: req.bucket.unwrap_or(Bucket::Cash),
            description: req.description.trim().to_string(),
            date: req.date.unwrap_or_else(Utc::now),
            source: req.source.unwrap_or(EntrySource::Manual),
            source_ref: req.source_ref,
            created_by: created_by.to_string(),
        };

        self.store.append_ledger_entry(entry).await
    }

    /// All entries, newest first.
    pub async fn list(&self) -> Result<Vec<LedgerEntry>, AppError> {
        self.store.list_ledger_entries().await
    }

    /// Latest CASH balance, 0 when the ledger is empty.
    pub async fn latest_balance(&self) -> Result<i64, AppError> {
        self.store.latest_cash_balance().await
    }

    /// Import a 2-column treasurer CSV (`Keterangan`,
    /// `Pengeluaran`/`Pendapatan`) as one atomic batch. Rows without a
    /// description or a positive amount are skipped; a row that would
    /// drive the balance negative aborts the entire batch.
    pub async fn import_csv<R: Read>(
        &self,
        reader: R,
        created_by: &str,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|e| AppError::validation(format!("Invalid CSV: {e}")))?
            .clone();

        let column = |name: &str| headers.iter().position(|h| h.trim() == name);
        let desc_idx = column("Keterangan")
            .ok_or_else(|| AppError::validation("Missing 'Keterangan' column"))?;
        let out_idx = column("Pengeluaran");
        let in_idx = column("Pendapatan");

        let now = Utc::now();
        let mut batch = Vec::new();

        for record in csv_reader.records() {
            let record = record.map_err(|e| AppError::validation(format!("Invalid CSV: {e}")))?;

            let description = record.get(desc_idx).unwrap_or("").trim().to_string();
            if description.is_empty() {
                continue;
            }

            let income = in_idx.and_then(|i| record.get(i)).map(parse_csv_amount).unwrap_or(0);
            let expense = out_idx.and_then(|i| record.get(i)).map(parse_csv_amount).unwrap_or(0);

            let (entry_type, amount) = if income > 0 {
                (EntryType::In, income)
            } else if expense > 0 {
                (EntryType::Out, expense)
            } else {
                continue;
            };

            batch.push(NewLedgerEntry {
                entry_type,
                amount,
                bucket: Bucket::Cash,
                description,
                date: now,
                source: EntrySource::Manual,
                source_ref: None,
                created_by: created_by.to_string(),
            });
        }

        self.store.append_ledger_entries(batch).await
    }
}

/// Parse a CSV amount cell, stripping comma thousand separators.
fn parse_csv_amount(value: &str) -> i64 {
    let cleaned = value.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0;
    }
    cleaned.parse::<f64>().map(|v| v.round() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cash_in(amount: i64) -> PostEntryRequest {
        PostEntryRequest {
            entry_type: EntryType::In,
            amount,
            description: "Iuran warga".to_string(),
            date: None,
            bucket: None,
            source: None,
            source_ref: None,
        }
    }

    fn cash_out(amount: i64) -> PostEntryRequest {
        PostEntryRequest {
            entry_type: EntryType::Out,
            amount,
            ..cash_in(amount)
        }
    }

    fn ledger() -> CashLedger {
        CashLedger::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn balance_rule_adds_and_subtracts() {
        let now = Utc::now();
        assert_eq!(next_cash_balance(None, now, EntryType::In, 1000).unwrap(), 1000);
        assert_eq!(
            next_cash_balance(Some((1000, now)), now, EntryType::Out, 400).unwrap(),
            600
        );
    }

    #[test]
    fn balance_rule_rejects_overdraft() {
        let now = Utc::now();
        let err = next_cash_balance(Some((300, now)), now, EntryType::Out, 400).unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict { code, .. } if code == codes::INSUFFICIENT_BALANCE
        ));
    }

    #[test]
    fn balance_rule_rejects_backdated_entries() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(1);
        let err = next_cash_balance(Some((300, now)), earlier, EntryType::In, 100).unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict { code, .. } if code == codes::BACKDATED_ENTRY
        ));
    }

    #[tokio::test]
    async fn sequential_postings_carry_running_balance() {
        let ledger = ledger();
        let first = ledger.post_entry(cash_in(1000), "tester").await.unwrap();
        let second = ledger.post_entry(cash_out(400), "tester").await.unwrap();
        assert_eq!(first.balance, Some(1000));
        assert_eq!(second.balance, Some(600));
        assert_eq!(ledger.latest_balance().await.unwrap(), 600);
    }

    #[tokio::test]
    async fn rejected_overdraft_persists_nothing() {
        let ledger = ledger();
        ledger.post_entry(cash_in(1000), "tester").await.unwrap();
        let err = ledger.post_entry(cash_out(5000), "tester").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(ledger.list().await.unwrap().len(), 1);
        assert_eq!(ledger.latest_balance().await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn deferred_entries_never_carry_a_balance() {
        let ledger = ledger();
        let entry = ledger
            .post_entry(
                PostEntryRequest {
                    bucket: Some(Bucket::Deferred),
                    ..cash_out(30_000)
                },
                "tester",
            )
            .await
            .unwrap();
        assert_eq!(entry.balance, None);
        // DEFERRED events do not move the cash balance.
        assert_eq!(ledger.latest_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_ledger_balance_is_zero() {
        assert_eq!(ledger().latest_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected() {
        let err = ledger().post_entry(cash_in(0), "tester").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn csv_import_replays_rows_in_order() {
        let ledger = ledger();
        let data = "Keterangan,Pendapatan,Pengeluaran\n\
                    Iuran Januari,\"1,000\",\n\
                    Beli sapu,,400\n\
                    ,,999\n";
        let inserted = ledger.import_csv(data.as_bytes(), "importer").await.unwrap();
        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[0].balance, Some(1000));
        assert_eq!(inserted[1].balance, Some(600));
    }

    #[tokio::test]
    async fn csv_import_aborts_whole_batch_on_overdraft() {
        let ledger = ledger();
        let data = "Keterangan,Pendapatan,Pengeluaran\n\
                    Iuran,500,\n\
                    Beli tenda,,900\n";
        let err = ledger.import_csv(data.as_bytes(), "importer").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict { code, .. } if code == codes::INSUFFICIENT_BALANCE
        ));
        assert!(ledger.list().await.unwrap().is_empty());
        assert_eq!(ledger.latest_balance().await.unwrap(), 0);
    }
}
