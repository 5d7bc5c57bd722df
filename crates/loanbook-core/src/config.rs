//! Engine configuration.
//!
//! Every field has a default so an empty document (or no document at all)
//! yields a working engine. The CLI reads this from YAML; scenario files may
//! embed it as a `config` block.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LoanbookError;
use crate::types::Rate;
use crate::LoanbookResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub codes: CodeFormat,
    /// Upper bound accepted for a product interest rate.
    pub max_interest_rate: Rate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            codes: CodeFormat::default(),
            max_interest_rate: dec!(5.0),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> LoanbookResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(LoanbookError::validation(
                "retry.max_attempts",
                "At least one attempt is required",
            ));
        }
        if self.max_interest_rate <= rust_decimal::Decimal::ZERO {
            return Err(LoanbookError::validation(
                "max_interest_rate",
                "Maximum interest rate must be positive",
            ));
        }
        for (field, prefix) in [
            ("codes.transaction_prefix", &self.codes.transaction_prefix),
            ("codes.payment_prefix", &self.codes.payment_prefix),
            ("codes.loan_prefix", &self.codes.loan_prefix),
        ] {
            if prefix.trim().is_empty() {
                return Err(LoanbookError::validation(field, "Code prefix cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Bounded retry applied to whole operations on optimistic conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 2,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff before the given (1-based) retry.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Human-readable code formats, e.g. `VTX-000042`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeFormat {
    pub transaction_prefix: String,
    pub payment_prefix: String,
    pub loan_prefix: String,
    pub width: usize,
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self {
            transaction_prefix: "VTX".into(),
            payment_prefix: "PAY".into(),
            loan_prefix: "LN".into(),
            width: 6,
        }
    }
}

impl CodeFormat {
    pub fn format(&self, prefix: &str, seq: u64) -> String {
        format!("{prefix}-{seq:0width$}", width = self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.codes.transaction_prefix, "VTX");
        assert_eq!(config.max_interest_rate, dec!(5.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_code_format_pads_sequence() {
        let codes = CodeFormat::default();
        assert_eq!(codes.format("VTX", 42), "VTX-000042");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
