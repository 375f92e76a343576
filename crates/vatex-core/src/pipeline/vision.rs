//! Vision/AI collaborator seam.
//!
//! The pipeline treats vision extraction as an opaque external service:
//! it hands over the raw document and receives either a structured
//! result or a [`VisionError`]. Prompting, model choice and network I/O
//! all live behind this trait, including the request timeout.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::VisionError;
use crate::models::{ExtractedAmounts, TaxCategory};

pub trait VisionService: Send + Sync {
    /// Extract tax amounts from the document. The implementation owns
    /// its own deadline and reports [`VisionError::Timeout`] itself.
    fn extract(
        &self,
        text: &str,
        file_name: &str,
        category: TaxCategory,
    ) -> Result<ExtractedAmounts, VisionError>;
}

/// Retry and pacing decorator around a [`VisionService`].
///
/// Cross-cutting resilience lives here rather than in the pipeline's
/// control flow: the pipeline still makes a single call and sees a
/// single outcome. Unavailability is retried a bounded number of
/// times; a timeout is not retried, its deadline is already spent.
pub struct ResilientVision<V> {
    inner: V,
    max_retries: u32,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl<V: VisionService> ResilientVision<V> {
    pub fn new(inner: V, max_retries: u32, min_interval: Duration) -> Self {
        Self {
            inner,
            max_retries,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Sleep until `min_interval` has passed since the previous call.
    fn pace(&self) {
        let mut last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

impl<V: VisionService> VisionService for ResilientVision<V> {
    fn extract(
        &self,
        text: &str,
        file_name: &str,
        category: TaxCategory,
    ) -> Result<ExtractedAmounts, VisionError> {
        let mut attempt = 0;
        loop {
            self.pace();
            match self.inner.extract(text, file_name, category) {
                Ok(result) => return Ok(result),
                Err(VisionError::Timeout(ms)) => return Err(VisionError::Timeout(ms)),
                Err(VisionError::Unavailable(reason)) => {
                    if attempt >= self.max_retries {
                        return Err(VisionError::Unavailable(reason));
                    }
                    attempt += 1;
                    warn!(attempt, reason = reason.as_str(), "vision call failed, retrying");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable vision double for pipeline tests.

    use std::sync::Mutex;

    use super::*;

    pub struct MockVision {
        outcomes: Mutex<Vec<Result<ExtractedAmounts, VisionError>>>,
        pub calls: Mutex<u32>,
    }

    impl MockVision {
        /// Outcomes are consumed front to back; the last one repeats.
        pub fn with_outcomes(outcomes: Vec<Result<ExtractedAmounts, VisionError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        pub fn unavailable() -> Self {
            Self::with_outcomes(vec![Err(VisionError::Unavailable(
                "service down".to_string(),
            ))])
        }
    }

    impl VisionService for MockVision {
        fn extract(
            &self,
            _text: &str,
            _file_name: &str,
            _category: TaxCategory,
        ) -> Result<ExtractedAmounts, VisionError> {
            *self.calls.lock().unwrap() += 1;
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                clone_outcome(&outcomes[0])
            }
        }
    }

    fn clone_outcome(
        outcome: &Result<ExtractedAmounts, VisionError>,
    ) -> Result<ExtractedAmounts, VisionError> {
        match outcome {
            Ok(amounts) => Ok(amounts.clone()),
            Err(VisionError::Unavailable(reason)) => {
                Err(VisionError::Unavailable(reason.clone()))
            }
            Err(VisionError::Timeout(ms)) => Err(VisionError::Timeout(*ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockVision;
    use super::*;
    use crate::models::{PatternTier, TaxCategory};
    use rust_decimal::Decimal;

    fn vision_result() -> ExtractedAmounts {
        let mut amounts = ExtractedAmounts::default();
        amounts.push_amount(
            TaxCategory::Purchases,
            Decimal::new(13496, 2),
            "vision",
            PatternTier::High,
            0.85,
        );
        amounts.set_confidence(0.85);
        amounts
    }

    #[test]
    fn test_retries_unavailable_then_succeeds() {
        let mock = MockVision::with_outcomes(vec![
            Err(VisionError::Unavailable("transient".to_string())),
            Ok(vision_result()),
        ]);
        let resilient = ResilientVision::new(mock, 2, Duration::ZERO);
        let result = resilient.extract("text", "a.pdf", TaxCategory::Purchases);
        assert!(result.is_ok());
    }

    #[test]
    fn test_retry_exhaustion_surfaces_unavailable() {
        let mock = MockVision::unavailable();
        let resilient = ResilientVision::new(mock, 2, Duration::ZERO);
        let err = resilient
            .extract("text", "a.pdf", TaxCategory::Purchases)
            .unwrap_err();
        assert!(matches!(err, VisionError::Unavailable(_)));
        assert_eq!(*resilient.inner.calls.lock().unwrap(), 3);
    }

    #[test]
    fn test_timeout_is_not_retried() {
        let mock = MockVision::with_outcomes(vec![Err(VisionError::Timeout(5000))]);
        let resilient = ResilientVision::new(mock, 5, Duration::ZERO);
        let err = resilient
            .extract("text", "a.pdf", TaxCategory::Purchases)
            .unwrap_err();
        assert!(matches!(err, VisionError::Timeout(5000)));
        assert_eq!(*resilient.inner.calls.lock().unwrap(), 1);
    }
}
