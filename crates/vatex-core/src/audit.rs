//! Structured audit port injected into pipeline components.
//!
//! Components never write to a concrete sink directly; they emit events
//! through an [`AuditSink`] so callers can route extraction diagnostics
//! to logs, an audit table, or nothing at all. Field values whose keys
//! are registered as sensitive are redacted before they leave the port.

use std::collections::HashSet;

/// Severity-tagged structured event sink.
///
/// `audit` is for events that must survive into the compliance trail
/// (amounts kept, amounts excluded, manual-review verdicts); the other
/// three mirror ordinary log levels.
pub trait AuditSink: Send + Sync {
    fn error(&self, event: &str, fields: &[(&str, String)]);
    fn warn(&self, event: &str, fields: &[(&str, String)]);
    fn info(&self, event: &str, fields: &[(&str, String)]);
    fn audit(&self, event: &str, fields: &[(&str, String)]);
}

/// Field keys that are redacted by the default sink.
const SENSITIVE_FIELDS: &[&str] = &["tax_id", "business_name", "file_name"];

/// Default sink forwarding events to `tracing`.
pub struct TracingSink {
    redact: HashSet<&'static str>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self {
            redact: SENSITIVE_FIELDS.iter().copied().collect(),
        }
    }

    /// Disable redaction (local debugging only).
    pub fn without_redaction(mut self) -> Self {
        self.redact.clear();
        self
    }

    fn render(&self, fields: &[(&str, String)]) -> String {
        fields
            .iter()
            .map(|(k, v)| {
                if self.redact.contains(k) {
                    format!("{k}=[redacted]")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for TracingSink {
    fn error(&self, event: &str, fields: &[(&str, String)]) {
        tracing::error!(event, fields = %self.render(fields));
    }

    fn warn(&self, event: &str, fields: &[(&str, String)]) {
        tracing::warn!(event, fields = %self.render(fields));
    }

    fn info(&self, event: &str, fields: &[(&str, String)]) {
        tracing::info!(event, fields = %self.render(fields));
    }

    fn audit(&self, event: &str, fields: &[(&str, String)]) {
        // Audit events are always emitted at info with a marker target
        tracing::info!(target: "vatex::audit", event, fields = %self.render(fields));
    }
}

/// Sink that drops everything. Useful in tests.
pub struct NullSink;

impl AuditSink for NullSink {
    fn error(&self, _event: &str, _fields: &[(&str, String)]) {}
    fn warn(&self, _event: &str, _fields: &[(&str, String)]) {}
    fn info(&self, _event: &str, _fields: &[(&str, String)]) {}
    fn audit(&self, _event: &str, _fields: &[(&str, String)]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_fields_redacted() {
        let sink = TracingSink::new();
        let rendered = sink.render(&[
            ("tax_id", "IE1234567T".to_string()),
            ("confidence", "0.85".to_string()),
        ]);
        assert!(rendered.contains("tax_id=[redacted]"));
        assert!(rendered.contains("confidence=0.85"));
        assert!(!rendered.contains("IE1234567T"));
    }

    #[test]
    fn test_redaction_can_be_disabled() {
        let sink = TracingSink::new().without_redaction();
        let rendered = sink.render(&[("tax_id", "IE1234567T".to_string())]);
        assert!(rendered.contains("IE1234567T"));
    }

    #[test]
    fn test_sinks_are_object_safe() {
        fn _assert(_: &dyn AuditSink) {}
        _assert(&TracingSink::new());
        _assert(&NullSink);
    }
}
