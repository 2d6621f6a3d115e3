//! Fixed allocation of a monthly-fee total across sub-accounts.
//!
//! This is a closed lookup table, not a formula. Adding a fee tier means
//! adding an explicit entry here; the engine never interpolates.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Allocation of one fee payment across the seven budget categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub kas_rt: i64,
    pub agama_rt: i64,
    pub sampah: i64,
    pub keamanan: i64,
    pub agama_rw: i64,
    pub kas_rw: i64,
    pub kkm_rw: i64,
}

impl FeeBreakdown {
    pub fn total(&self) -> i64 {
        self.kas_rt
            + self.agama_rt
            + self.sampah
            + self.keamanan
            + self.agama_rw
            + self.kas_rw
            + self.kkm_rw
    }
}

/// Map a known fee total to its fixed allocation.
///
/// Recognized totals: 100000 (security-only), 186000, and the full
/// 200000/210000 tier, which share one allocation. Anything else is an
/// `UnsupportedAmount` error.
pub fn breakdown(total: i64) -> Result<FeeBreakdown, AppError> {
    match total {
        100_000 => Ok(FeeBreakdown {
            kas_rt: 0,
            agama_rt: 0,
            sampah: 0,
            keamanan: 100_000,
            agama_rw: 0,
            kas_rw: 0,
            kkm_rw: 0,
        }),
        200_000 | 210_000 => Ok(FeeBreakdown {
            kas_rt: 30_000,
            agama_rt: 2_400,
            sampah: 50_000,
            keamanan: 97_500,
            agama_rw: 21_600,
            kas_rw: 3_000,
            kkm_rw: 5_500,
        }),
        186_000 => Ok(FeeBreakdown {
            kas_rt: 30_000,
            agama_rt: 0,
            sampah: 50_000,
            keamanan: 97_500,
            agama_rw: 0,
            kas_rw: 3_000,
            kkm_rw: 5_500,
        }),
        other => Err(AppError::UnsupportedAmount(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_sum_to_their_totals() {
        assert_eq!(breakdown(100_000).unwrap().total(), 100_000);
        assert_eq!(breakdown(186_000).unwrap().total(), 186_000);
        assert_eq!(breakdown(210_000).unwrap().total(), 210_000);
    }

    #[test]
    fn discounted_tier_shares_the_full_allocation() {
        // The 200000 tier reuses the 210000 allocation table as-is.
        assert_eq!(breakdown(200_000).unwrap(), breakdown(210_000).unwrap());
    }

    #[test]
    fn unknown_totals_are_rejected() {
        assert!(matches!(
            breakdown(123_456),
            Err(AppError::UnsupportedAmount(123_456))
        ));
        assert!(breakdown(0).is_err());
    }
}
