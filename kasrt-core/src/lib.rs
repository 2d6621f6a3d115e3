//! kasrt-core: finance backend for a neighborhood association (RT).
//!
//! Residents submit proof-of-payment photos for the monthly fee; the
//! backend extracts the amount with OCR, routes the record through an
//! approval flow, keeps the cash ledger with a running balance, tracks
//! prepaid multi-month subscriptions and reports collected fees upward
//! to the RW treasurer.

pub mod auth;
pub mod breakdown;
pub mod config;
pub mod db;
pub mod deferred;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod models;
pub mod ports;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod store;
pub mod submission;
pub mod worker;
