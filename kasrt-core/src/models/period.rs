use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

static PERIOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("period regex")
});

const MONTH_NAMES: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni", "Juli", "Agustus",
    "September", "Oktober", "November", "Desember",
];

/// A calendar month identifier in "YYYY-MM" form.
///
/// The string representation is chosen so that lexicographic comparison
/// matches chronological order; the derived `Ord` relies on that.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Period(String);

impl Period {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        if PERIOD_RE.is_match(s) {
            Ok(Period(s.to_string()))
        } else {
            Err(AppError::validation(format!(
                "Invalid period format: {s} (expected YYYY-MM)"
            )))
        }
    }

    /// The current calendar month in UTC.
    pub fn current() -> Self {
        let now = Utc::now();
        Period(format!("{:04}-{:02}", now.year(), now.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> &str {
        &self.0[..4]
    }

    pub fn month(&self) -> &str {
        &self.0[5..]
    }

    /// Human-readable Indonesian label, e.g. "Januari 2025".
    pub fn month_label(&self) -> String {
        let month: usize = self.month().parse().unwrap_or(1);
        format!("{} {}", MONTH_NAMES[month - 1], self.year())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::parse(s)
    }
}
