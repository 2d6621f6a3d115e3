//! Heuristic extraction of a payment amount from OCR free text.
//!
//! Bank transfer receipts come in wildly different layouts, so this is a
//! layered rule engine rather than a parser: currency markers first, the
//! word "nominal" second, bare digit runs last. A `None` or implausible
//! result means "needs manual input" downstream, never a hard failure.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static CURRENCY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(Rp|IDR)\s*([0-9.,]+)").expect("currency regex"));

static NOMINAL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)nominal\s*([0-9.,]+)").expect("nominal regex"));

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{4,}").expect("digit regex"));

/// Smallest value accepted from the marker tiers; receipts never carry a
/// fee below this, so smaller matches are OCR noise.
const MIN_MARKER_AMOUNT: i64 = 1_000;

/// Digit runs at or above this are treated as account numbers, not
/// amounts.
const ACCOUNT_NUMBER_FLOOR: i64 = 100_000_000;

/// Parse a numeric token like "210.000,00": strip a trailing ".00"/",00"
/// decimal suffix, drop the remaining dot/comma thousand separators.
fn parse_token(token: &str) -> Option<i64> {
    let trimmed = token
        .strip_suffix(".00")
        .or_else(|| token.strip_suffix(",00"))
        .unwrap_or(token);

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Extract a single integer amount from raw OCR text, or `None` when the
/// text carries no usable number.
pub fn extract_amount(raw: &str) -> Option<i64> {
    let text = WHITESPACE.replace_all(raw, " ");

    // Tier 1: explicit currency markers (Rp / IDR).
    let mut candidates: Vec<i64> = CURRENCY_MARKER
        .captures_iter(&text)
        .filter_map(|cap| parse_token(&cap[2]))
        .filter(|&n| n >= MIN_MARKER_AMOUNT)
        .collect();

    // Tier 2: "Nominal 100.000,00" style labels.
    if candidates.is_empty() {
        candidates = NOMINAL_MARKER
            .captures_iter(&text)
            .filter_map(|cap| parse_token(&cap[1]))
            .filter(|&n| n >= MIN_MARKER_AMOUNT)
            .collect();
    }

    // Tier 3: any 4+ digit run, minus account-number noise. When several
    // remain, the largest is usually a trailing running-balance figure, so
    // take the second largest.
    if candidates.is_empty() {
        let mut runs: Vec<i64> = DIGIT_RUN
            .find_iter(&text)
            .filter_map(|m| m.as_str().parse::<i64>().ok())
            .filter(|&n| n < ACCOUNT_NUMBER_FLOOR)
            .collect();

        if runs.is_empty() {
            return None;
        }

        runs.sort_unstable();
        candidates.push(if runs.len() == 1 {
            runs[0]
        } else {
            runs[runs.len() - 2]
        });
    }

    let mut amount = *candidates.iter().max()?;

    // Interbank transfer fees (2500 / 6500) sometimes get appended to the
    // nominal by the OCR; peel them off.
    let digits = amount.to_string();
    if digits.len() >= 4 {
        match &digits[digits.len() - 4..] {
            "2500" => amount -= 2_500,
            "6500" => amount -= 6_500,
            _ => {}
        }
    }

    Some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rp_marker_with_decimal_suffix() {
        assert_eq!(extract_amount("Total Rp 210.000,00"), Some(210_000));
    }

    #[test]
    fn extracts_idr_marker_case_insensitive() {
        assert_eq!(extract_amount("berhasil idr 186.000 transfer"), Some(186_000));
    }

    #[test]
    fn picks_largest_marker_candidate() {
        let text = "Biaya admin Rp 2.500 Total Rp 200.000";
        // 2500 is below the largest candidate; the fee rule then does not
        // apply because 200000 does not end in 2500/6500.
        assert_eq!(extract_amount(text), Some(200_000));
    }

    #[test]
    fn ignores_marker_values_below_floor() {
        assert_eq!(extract_amount("Rp 500 saja"), None);
    }

    #[test]
    fn falls_back_to_nominal_label() {
        assert_eq!(extract_amount("Nominal 100.000,00 BERHASIL"), Some(100_000));
    }

    #[test]
    fn bare_digits_pick_second_largest() {
        // Transfer amount followed by a larger running balance; the
        // heuristic skips the balance.
        assert_eq!(extract_amount("transfer 210000 saldo 1500000"), Some(210_000));
    }

    #[test]
    fn bare_digits_single_candidate_is_used() {
        assert_eq!(extract_amount("bukti 150000 ok"), Some(150_000));
    }

    #[test]
    fn account_numbers_are_discarded() {
        // The 10-digit account number is over the plausibility ceiling.
        assert_eq!(extract_amount("rek 1234567890 bayar 100000"), Some(100_000));
    }

    #[test]
    fn strips_trailing_2500_bank_fee() {
        assert_eq!(extract_amount("Rp 97502500"), Some(97_500_000));
    }

    #[test]
    fn strips_trailing_6500_bank_fee() {
        assert_eq!(extract_amount("Rp 2106500"), Some(2_100_000));
    }

    #[test]
    fn no_digits_yields_none() {
        assert_eq!(extract_amount("tidak ada angka di sini"), None);
        assert_eq!(extract_amount(""), None);
    }
}
