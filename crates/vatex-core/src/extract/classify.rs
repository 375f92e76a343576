//! Keyword-based document-type classifier.
//!
//! A deliberately lightweight scan: the classifier only has to be good
//! enough to override the caller's category hint when the text clearly
//! says otherwise. Anything ambiguous stays [`DocumentType::Other`] with
//! low confidence and the hint wins.

use crate::models::{DocumentType, TaxCategory};

/// Classifier output: a guess plus how sure the keyword evidence is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub document_type: DocumentType,
    pub confidence: f32,
}

/// The hint wins unless the classifier reaches this confidence.
pub const HINT_OVERRIDE_THRESHOLD: f32 = 0.7;

/// Classify a document from keyword evidence, given the caller's hint.
pub fn classify(text: &str, hint: TaxCategory) -> Classification {
    let lower = text.to_lowercase();

    let is_receipt = lower.contains("receipt") || lower.contains("till");
    let is_invoice = lower.contains("invoice");

    // Strong sales signals: we issued the document.
    let mut sales_score = 0.0f32;
    if is_invoice && lower.contains("bill to") {
        sales_score += 0.5;
    }
    if lower.contains("our vat") || lower.contains("seller") {
        sales_score += 0.2;
    }
    if lower.contains("financial services") {
        sales_score += 0.3;
    }

    // Strong purchase signals: someone billed us.
    let mut purchase_score = 0.0f32;
    if lower.contains("lease") || lower.contains("supplier") {
        purchase_score += 0.4;
    }
    if lower.contains("amount due") || lower.contains("please pay") {
        purchase_score += 0.3;
    }
    if is_receipt {
        purchase_score += 0.2;
    }

    let (category, confidence) = if sales_score > purchase_score {
        (Some(TaxCategory::Sales), sales_score.min(1.0))
    } else if purchase_score > sales_score {
        (Some(TaxCategory::Purchases), purchase_score.min(1.0))
    } else {
        (None, 0.0)
    };

    // Below the override threshold the caller's hint decides the side.
    let effective = if confidence >= HINT_OVERRIDE_THRESHOLD {
        category.unwrap_or(hint)
    } else {
        hint
    };

    let document_type = match (effective, is_invoice, is_receipt) {
        (TaxCategory::Sales, true, _) => DocumentType::SalesInvoice,
        (TaxCategory::Sales, false, true) => DocumentType::SalesReceipt,
        (TaxCategory::Purchases, true, _) => DocumentType::PurchaseInvoice,
        (TaxCategory::Purchases, false, true) => DocumentType::PurchaseReceipt,
        _ => DocumentType::Other,
    };

    Classification {
        document_type,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_used_when_classifier_unsure() {
        let result = classify("Invoice No. 42\nVAT: 10.00", TaxCategory::Purchases);
        assert_eq!(result.document_type, DocumentType::PurchaseInvoice);
        assert!(result.confidence < HINT_OVERRIDE_THRESHOLD);
    }

    #[test]
    fn test_strong_sales_evidence_overrides_hint() {
        let text = "INVOICE\nBill To: Acme Ltd\nOur VAT: IE1234567T\nFinancial services";
        let result = classify(text, TaxCategory::Purchases);
        assert!(result.confidence >= HINT_OVERRIDE_THRESHOLD);
        assert_eq!(result.document_type, DocumentType::SalesInvoice);
    }

    #[test]
    fn test_receipt_keyword_sets_receipt_type() {
        let result = classify("Till receipt\nTax: 2.30", TaxCategory::Purchases);
        assert_eq!(result.document_type, DocumentType::PurchaseReceipt);
    }

    #[test]
    fn test_no_keywords_is_other() {
        let result = classify("random text with a number 12.00", TaxCategory::Sales);
        assert_eq!(result.document_type, DocumentType::Other);
        assert_eq!(result.confidence, 0.0);
    }
}
