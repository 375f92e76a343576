//! Tiered regex pattern library for locating tax amounts in plain text.
//!
//! Patterns are grouped into three priority tiers, evaluated in order by
//! the text extractor. Higher tiers are more specific labels and more
//! trusted; once a tier yields an amount, lower tiers are skipped.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Amount fragment shared by every labeled pattern: optional euro sign,
/// optional thousands separators, up to two decimal places.
const AMOUNT: &str = r"(?:€\s*)?(-?\d{1,3}(?:,\d{3})*(?:\.\d{1,2})?|-?\d+(?:\.\d{1,2})?)";

fn labeled(label: &str) -> Regex {
    Regex::new(&format!(r"(?i){label}[\s:]*{AMOUNT}")).unwrap()
}

lazy_static! {
    // Tier 1: explicit labeled VAT totals.
    pub static ref HIGH_PRIORITY: Vec<(&'static str, Regex)> = vec![
        ("total_amount_vat", labeled(r"total\s+amount\s+vat")),
        ("vat_total", labeled(r"vat\s+total(?:\s+amount)?")),
        ("total_vat", labeled(r"total\s+vat(?:\s+amount)?")),
        ("vat_breakdown_total", labeled(r"vat\s+breakdown\s+total")),
    ];

    // Tier 2: rate-qualified VAT lines and rate-category codes.
    pub static ref STANDARD: Vec<(&'static str, Regex)> = vec![
        (
            "vat_at_rate",
            Regex::new(&format!(
                r"(?i)vat\s*@?\s*\d{{1,2}}(?:\.\d{{1,2}})?\s*%[\s:]*{AMOUNT}"
            ))
            .unwrap(),
        ),
        (
            "rate_category_code",
            Regex::new(&format!(
                r"(?i)\b(?:STD23|RED13\.5|TOU9|MIN|NIL)\b[\s:]*{AMOUNT}"
            ))
            .unwrap(),
        ),
    ];

    // Tier 3: bare VAT/tax lines, currency-first, localized labels.
    pub static ref GENERIC: Vec<(&'static str, Regex)> = vec![
        ("vat_line", labeled(r"\bvat\b")),
        ("tax_line", labeled(r"\btax\b")),
        (
            "currency_first",
            Regex::new(r"(?i)€\s*(\d{1,3}(?:,\d{3})*(?:\.\d{1,2})?)\s*(?:vat|tax)\b").unwrap(),
        ),
        ("cbl_line", labeled(r"\bCBL\b")),
        ("tva_line", labeled(r"\bTVA\b")),
        ("mwst_line", labeled(r"\bMwSt\.?")),
    ];

    // Monetary mentions that are not tax: recurring payments, leases,
    // rentals, instalments. Amounts matched here are excluded everywhere.
    pub static ref EXCLUSIONS: Vec<(&'static str, Regex)> = vec![
        ("lease_payment", labeled(r"lease(?:\s+payment)?")),
        ("rent_payment", labeled(r"rent(?:al)?(?:\s+payment)?")),
        ("instalment", labeled(r"insta[l]?lment(?:\s+\d+(?:\s+of\s+\d+)?)?")),
        ("monthly_payment", labeled(r"monthly\s+payment")),
        ("direct_debit", labeled(r"direct\s+debit")),
        ("finance_payment", labeled(r"(?:finance|hire\s+purchase)\s+payment")),
    ];

    /// VAT rate as a percentage, labeled.
    pub static ref TAX_RATE: Regex = Regex::new(
        r"(?i)(?:vat|tax)\s*(?:rate)?\s*@?\s*[:=]?\s*(\d{1,2}(?:\.\d{1,2})?)\s*%"
    ).unwrap();

    /// Rate-category code on its own, for recovering the rate itself.
    pub static ref RATE_CODE: Regex = Regex::new(
        r"(?i)\b(STD23|RED13\.5|TOU9|MIN|NIL)\b"
    ).unwrap();

    /// Document grand total. `total\s+amount` deliberately does not match
    /// "Total Amount VAT" because the amount must follow the label.
    pub static ref TOTAL_AMOUNT: Regex = Regex::new(&format!(
        r"(?i)(?:grand\s+total|invoice\s+total|total\s+due|amount\s+due|total\s+amount|total)[\s:]*{AMOUNT}"
    )).unwrap();

    /// Deep-scan fallback: any tax keyword within a line that also holds
    /// a plausible monetary value.
    pub static ref DEEP_SCAN_LINE: Regex = Regex::new(
        r"(?i)\b(?:vat|tax|duty|levy)\b"
    ).unwrap();

    pub static ref ANY_AMOUNT: Regex = Regex::new(
        r"(?:€\s*)?(\d{1,3}(?:,\d{3})*\.\d{2}|\d+\.\d{2})"
    ).unwrap();
}

/// Map a jurisdiction rate-category code to its percentage.
pub fn rate_for_code(code: &str) -> Option<Decimal> {
    match code.to_ascii_uppercase().as_str() {
        "STD23" => Some(Decimal::new(23, 0)),
        "RED13.5" => Some(Decimal::new(135, 1)),
        "TOU9" => Some(Decimal::new(9, 0)),
        "MIN" => Some(Decimal::new(48, 1)),
        "NIL" => Some(Decimal::ZERO),
        _ => None,
    }
}

/// Parse a monetary string: optional `€`, comma thousands separators,
/// dot or trailing-comma decimal separator.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Comma after dot: comma is the decimal separator.
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        // Dot after comma, or dot only: commas are thousands separators.
        (Some(_), Some(_)) | (Some(_), None) => {
            // A lone comma with exactly two trailing digits is a decimal.
            let tail = cleaned.rsplit(',').next().unwrap_or("");
            if !cleaned.contains('.') && tail.len() == 2 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Round to 2 decimal places, the resolution used for dedup and the
/// exclusion set.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}
