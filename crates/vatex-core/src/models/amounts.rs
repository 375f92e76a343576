//! Canonical extraction data model.
//!
//! [`ExtractedAmounts`] is the unit that moves through the pipeline:
//! produced by an extractor, checked by the compliance validator, scored
//! by the quality scorer, and reconciled by the cross-validation engine.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Caller-supplied ledger side for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// Output VAT — tax charged on sales.
    Sales,
    /// Input VAT — tax reclaimable on purchases.
    Purchases,
}

/// Document type guessed by the classifier (or declared by a template).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    SalesInvoice,
    PurchaseInvoice,
    SalesReceipt,
    PurchaseReceipt,
    #[default]
    Other,
}

impl DocumentType {
    /// The ledger side this document type implies, if it implies one.
    pub fn category(&self) -> Option<TaxCategory> {
        match self {
            DocumentType::SalesInvoice | DocumentType::SalesReceipt => Some(TaxCategory::Sales),
            DocumentType::PurchaseInvoice | DocumentType::PurchaseReceipt => {
                Some(TaxCategory::Purchases)
            }
            DocumentType::Other => None,
        }
    }
}

/// Priority class of the pattern (or aggregation) that produced an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTier {
    /// Explicit labeled VAT totals ("Total Amount VAT", breakdown totals).
    High,
    /// Rate-qualified lines and rate-category codes (STD23, RED13.5, ...).
    Standard,
    /// Bare "VAT:"/"Tax:" lines and localized fallbacks.
    Generic,
    /// Computed from total and rate, not read from the document.
    Derived,
    /// Produced by a spreadsheet aggregation method.
    Aggregate,
}

/// Explains why a single amount was kept. Required for auditability:
/// every value in `sales_tax`/`purchase_tax` has exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub amount: Decimal,
    /// Name of the pattern or aggregation method that matched.
    pub source_pattern: String,
    pub tier: PatternTier,
    /// Confidence contribution of this single match (0.0 - 1.0).
    pub local_confidence: f32,
}

/// The canonical extraction result moving through the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedAmounts {
    /// Output VAT amounts, in discovery order. Values are >= 0 when
    /// produced by the extractors; a negative value is a validator error.
    pub sales_tax: Vec<Decimal>,

    /// Input VAT amounts, in discovery order.
    pub purchase_tax: Vec<Decimal>,

    /// Document grand total, when a total line was found.
    pub total_amount: Option<Decimal>,

    /// VAT rate as a percentage (e.g. 23), when one was found.
    pub tax_rate: Option<Decimal>,

    /// Extraction confidence (0.0 - 1.0). Adjusted only by named stages.
    pub confidence: f32,

    pub document_type: DocumentType,

    /// One entry per kept amount, in the same order amounts were kept.
    pub provenance: Vec<Provenance>,

    /// Machine-readable issue codes accumulated by later stages.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub validation_flags: BTreeSet<String>,
}

impl ExtractedAmounts {
    pub fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            ..Self::default()
        }
    }

    /// Record an amount together with its provenance.
    ///
    /// This is the only way amounts enter the struct, which keeps the
    /// no-orphan invariant: every amount has exactly one provenance entry.
    pub fn push_amount(
        &mut self,
        category: TaxCategory,
        amount: Decimal,
        source_pattern: impl Into<String>,
        tier: PatternTier,
        local_confidence: f32,
    ) {
        match category {
            TaxCategory::Sales => self.sales_tax.push(amount),
            TaxCategory::Purchases => self.purchase_tax.push(amount),
        }
        self.provenance.push(Provenance {
            amount,
            source_pattern: source_pattern.into(),
            tier,
            local_confidence,
        });
    }

    /// All amounts regardless of ledger side, in discovery order.
    pub fn all_amounts(&self) -> Vec<Decimal> {
        self.sales_tax
            .iter()
            .chain(self.purchase_tax.iter())
            .copied()
            .collect()
    }

    /// Sum of all extracted tax amounts.
    pub fn total_tax(&self) -> Decimal {
        self.all_amounts().iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sales_tax.is_empty() && self.purchase_tax.is_empty()
    }

    pub fn add_flag(&mut self, code: impl Into<String>) {
        self.validation_flags.insert(code.into());
    }

    /// Clamp-and-set used by extraction stages when they finish.
    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    /// Multiply confidence by a quality boost, staying within [0, 1].
    pub fn apply_boost(&mut self, boost: f32) {
        self.confidence = (self.confidence * boost).clamp(0.0, 1.0);
    }

    /// Check the provenance invariant: amount counts match and every
    /// amount value appears among the provenance entries.
    pub fn provenance_consistent(&self) -> bool {
        let amounts = self.all_amounts();
        if amounts.len() != self.provenance.len() {
            return false;
        }
        let mut remaining: Vec<Decimal> = self.provenance.iter().map(|p| p.amount).collect();
        for amount in amounts {
            match remaining.iter().position(|a| *a == amount) {
                Some(idx) => {
                    remaining.swap_remove(idx);
                }
                None => return false,
            }
        }
        true
    }
}
