//! Configuration structures for the extraction pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main configuration for the vatex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VatexConfig {
    /// Jurisdiction the compliance validator checks against.
    pub jurisdiction: JurisdictionConfig,

    /// Thresholds for the fragile spreadsheet/amount heuristics.
    pub heuristics: HeuristicConfig,

    /// Strategy confidence floors and batch pacing.
    pub pipeline: PipelineConfig,
}

/// Jurisdiction-specific tax rules. Defaults describe Ireland.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JurisdictionConfig {
    /// ISO country code.
    pub country: String,

    /// Valid VAT rates as percentages.
    pub valid_rates: Vec<Decimal>,

    /// Regex the jurisdiction's VAT numbers must match.
    pub tax_id_pattern: String,

    /// Expected currency code.
    pub currency: String,
}

impl Default for JurisdictionConfig {
    fn default() -> Self {
        Self {
            country: "IE".to_string(),
            valid_rates: vec![
                Decimal::ZERO,
                Decimal::new(48, 1),  // 4.8 livestock
                Decimal::new(9, 0),   // 9 tourism/hospitality
                Decimal::new(135, 1), // 13.5 reduced
                Decimal::new(23, 0),  // 23 standard
            ],
            tax_id_pattern: "^[A-Z]{2}[0-9]{7}[A-Z]{1,2}$".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

/// Tunable thresholds for heuristics that are known to be fragile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// A country's largest tax value is treated as the subtotal when it
    /// exceeds this multiple of the sum of that country's other rows.
    pub subtotal_dominance_ratio: f64,

    /// Tolerance for subtotal + tax vs grand total.
    pub total_tolerance: Decimal,

    /// Tolerance for line-item tax sum vs extracted tax sum.
    pub line_item_tolerance: Decimal,

    /// Round-number amounts at or above this raise an estimate warning.
    pub round_number_threshold: Decimal,

    /// Amounts below this are flagged as suspiciously tiny.
    pub tiny_amount: Decimal,

    /// Amounts above this are flagged as suspiciously huge.
    pub huge_amount: Decimal,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            subtotal_dominance_ratio: 1.5,
            total_tolerance: Decimal::new(1, 2),     // 0.01
            line_item_tolerance: Decimal::ONE,       // 1.00
            round_number_threshold: Decimal::new(100, 0),
            tiny_amount: Decimal::new(1, 2),         // 0.01
            huge_amount: Decimal::new(1_000_000, 0),
        }
    }
}

/// Pipeline strategy floors and batch pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Confidence floor for the vision/AI strategy.
    pub vision_floor: f32,

    /// Confidence floor for spreadsheet aggregation.
    pub spreadsheet_floor: f32,

    /// Confidence floor for text pattern extraction.
    pub text_floor: f32,

    /// Confidence floor for template matching.
    pub template_floor: f32,

    /// Confidence floor for the deep fallback scan.
    pub deep_scan_floor: f32,

    /// Documents processed concurrently during batch runs.
    pub batch_size: usize,

    /// Pause between batch windows, for external rate limits.
    pub batch_pause_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vision_floor: 0.70,
            spreadsheet_floor: 0.60,
            text_floor: 0.60,
            template_floor: 0.50,
            deep_scan_floor: 0.40,
            batch_size: 4,
            batch_pause_ms: 500,
        }
    }
}

impl VatexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_jurisdiction_is_irish() {
        let config = VatexConfig::default();
        assert_eq!(config.jurisdiction.country, "IE");
        assert_eq!(config.jurisdiction.currency, "EUR");
        assert!(config
            .jurisdiction
            .valid_rates
            .contains(&Decimal::new(23, 0)));
        assert!(config
            .jurisdiction
            .valid_rates
            .contains(&Decimal::new(135, 1)));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: VatexConfig =
            serde_json::from_str(r#"{"pipeline": {"batch_size": 8}}"#).unwrap();
        assert_eq!(config.pipeline.batch_size, 8);
        assert_eq!(config.pipeline.vision_floor, 0.70);
        assert_eq!(config.jurisdiction.currency, "EUR");
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = VatexConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: VatexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.heuristics.subtotal_dominance_ratio,
            config.heuristics.subtotal_dominance_ratio
        );
    }
}
