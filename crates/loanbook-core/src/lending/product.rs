use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LoanbookError;
use crate::types::*;
use crate::LoanbookResult;

/// Default ceiling on product interest rates (500%).
pub const DEFAULT_MAX_INTEREST_RATE: Rate = dec!(5.0);

/// How interest accrues over the loan term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestType {
    /// Rate applies per 30-day month on the original principal
    FlatMonthly,
    /// Annual rate spread over days on the original principal (not amortised)
    ReducingBalance,
}

/// How a late penalty is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyType {
    /// A flat amount once the grace period has elapsed
    Fixed,
    /// A fraction of the outstanding base
    Percentage,
}

/// A lending product offered to borrowers. Loans snapshot its rate, so a
/// product is treated as immutable once referenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanProduct {
    pub id: Uuid,
    pub name: String,
    pub interest_type: InterestType,
    /// 0.25 = 25% per period of the interest type
    pub interest_rate: Rate,
    pub max_amount: Money,
    #[serde(default)]
    pub min_amount: Money,
    pub default_term_days: u32,
    pub grace_days: u32,
    pub penalty_type: PenaltyType,
    pub penalty_value: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl LoanProduct {
    /// Check the product's own configuration against the allowed rate ceiling.
    pub fn validate(&self, max_interest_rate: Rate) -> LoanbookResult<()> {
        if self.name.trim().is_empty() {
            return Err(LoanbookError::validation(
                "name",
                "Product name cannot be empty",
            ));
        }
        if self.interest_rate <= Decimal::ZERO || self.interest_rate > max_interest_rate {
            return Err(LoanbookError::validation(
                "interest_rate",
                format!("Interest rate must be in (0, {max_interest_rate}]"),
            ));
        }
        if self.interest_rate.scale() > RATE_DP && round_rate(self.interest_rate) != self.interest_rate
        {
            return Err(LoanbookError::validation(
                "interest_rate",
                "Interest rate carries more than 4 fraction digits",
            ));
        }
        if self.max_amount <= Decimal::ZERO {
            return Err(LoanbookError::validation(
                "max_amount",
                "Maximum amount must be positive",
            ));
        }
        if self.min_amount < Decimal::ZERO || self.min_amount > self.max_amount {
            return Err(LoanbookError::validation(
                "min_amount",
                "Minimum amount must be between 0 and max_amount",
            ));
        }
        if self.default_term_days == 0 {
            return Err(LoanbookError::validation(
                "default_term_days",
                "Default term must be at least 1 day",
            ));
        }
        self.validate_penalty()
    }

    /// Penalty settings only; enough for a standalone penalty quote.
    pub fn validate_penalty(&self) -> LoanbookResult<()> {
        if self.penalty_value < Decimal::ZERO {
            return Err(LoanbookError::validation(
                "penalty_value",
                "Penalty value cannot be negative",
            ));
        }
        if self.penalty_type == PenaltyType::Percentage && self.penalty_value > Decimal::ONE {
            return Err(LoanbookError::validation(
                "penalty_value",
                "Percentage penalty must be expressed as a fraction no greater than 1",
            ));
        }
        Ok(())
    }
}
