//! Known-layout template matching.
//!
//! A small library of named layouts tried after pattern extraction has
//! failed: each template pairs an anchor regex that identifies the
//! layout with an amount regex positioned for that layout. Templates
//! catch documents whose tax figure is laid out columnar or bare, where
//! no label sits on the same line.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::extract::patterns::{parse_amount, round2};
use crate::models::{ExtractedAmounts, PatternTier, TaxCategory};

pub struct Template {
    pub name: &'static str,
    /// Identifies the layout; must match before amounts are read.
    anchor: Regex,
    /// Captures the tax amount within that layout.
    amount: Regex,
    confidence: f32,
}

pub struct TemplateLibrary {
    templates: Vec<Template>,
}

lazy_static! {
    static ref BUILTIN: Vec<(&'static str, &'static str, &'static str, f32)> = vec![
        // Columnar invoice footer: "VAT" alone on a line, figure next.
        (
            "standard_invoice",
            r"(?i)\binvoice\b",
            r"(?im)^\s*vat\s*$\s*^\s*€?\s*(\d{1,3}(?:,\d{3})*\.\d{2})\s*$",
            0.55,
        ),
        // Till receipts print the tax line as "TAX 2.30".
        (
            "till_receipt",
            r"(?i)\b(?:receipt|till)\b",
            r"(?im)^\s*tax\s+€?\s*(\d{1,3}(?:,\d{3})*\.\d{2})\s*$",
            0.55,
        ),
        // Card/bank statements describe the charge in prose.
        (
            "statement",
            r"(?i)\bstatement\b",
            r"(?i)vat\s+charged(?:\s+this\s+period)?[\s:]*€?\s*(\d{1,3}(?:,\d{3})*\.\d{2})",
            0.55,
        ),
    ];
}

impl TemplateLibrary {
    pub fn new() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|(name, anchor, amount, confidence)| Template {
                name,
                anchor: Regex::new(anchor).unwrap(),
                amount: Regex::new(amount).unwrap(),
                confidence: *confidence,
            })
            .collect();
        Self { templates }
    }

    /// Try each template in order; the first whose anchor and amount
    /// both match wins.
    pub fn match_text(&self, text: &str, category: TaxCategory) -> Option<ExtractedAmounts> {
        for template in &self.templates {
            if !template.anchor.is_match(text) {
                continue;
            }
            let mut result = ExtractedAmounts::default();
            for caps in template.amount.captures_iter(text) {
                if let Some(amount) = parse_amount(&caps[1]) {
                    if amount > Decimal::ZERO {
                        result.push_amount(
                            category,
                            round2(amount),
                            format!("template:{}", template.name),
                            PatternTier::Standard,
                            template.confidence,
                        );
                    }
                }
            }
            if !result.is_empty() {
                debug!(template = template.name, "template matched");
                result.set_confidence(template.confidence);
                return Some(result);
            }
        }
        None
    }
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self::new()
    }
}
