//! Repayment waterfall.
//!
//! A payment is consumed penalty first, then interest, then principal. Each
//! bucket absorbs `min(remaining, outstanding)`; whatever is left over is
//! reported as overpayment for the caller to refund or credit. The split is
//! exact: `penalty + interest + principal + overpayment == amount_paid`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LoanbookError;
use crate::types::*;
use crate::LoanbookResult;

/// Unpaid remainder of each bucket at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outstanding {
    pub penalty: Money,
    pub interest: Money,
    pub principal: Money,
}

impl Outstanding {
    pub fn total(&self) -> Money {
        self.penalty.max(Decimal::ZERO)
            + self.interest.max(Decimal::ZERO)
            + self.principal.max(Decimal::ZERO)
    }

    pub fn is_settled(&self) -> bool {
        self.total().is_zero()
    }
}

/// Outstanding balances with their total, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingSummary {
    pub penalty: Money,
    pub interest: Money,
    pub principal: Money,
    pub total: Money,
}

impl From<Outstanding> for OutstandingSummary {
    fn from(o: Outstanding) -> Self {
        OutstandingSummary {
            penalty: o.penalty.max(Decimal::ZERO),
            interest: o.interest.max(Decimal::ZERO),
            principal: o.principal.max(Decimal::ZERO),
            total: o.total(),
        }
    }
}

/// How one payment was split across the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub penalty: Money,
    pub interest: Money,
    pub principal: Money,
    pub overpayment: Money,
}

impl Allocation {
    /// Amount actually applied to the loan (excludes overpayment).
    pub fn applied(&self) -> Money {
        self.penalty + self.interest + self.principal
    }
}

/// Standalone allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub outstanding: Outstanding,
    pub amount_paid: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub allocation: Allocation,
    pub remaining: OutstandingSummary,
    pub fully_settled: bool,
}

/// Split `amount_paid` across penalty, interest and principal in that order.
pub fn allocate(outstanding: &Outstanding, amount_paid: Money) -> LoanbookResult<Allocation> {
    if amount_paid <= Decimal::ZERO {
        return Err(LoanbookError::validation(
            "amount_paid",
            "Payment amount must be positive",
        ));
    }

    let mut remaining = amount_paid;
    let mut take = |bucket: Money| {
        let absorbed = remaining.min(bucket.max(Decimal::ZERO));
        remaining -= absorbed;
        absorbed
    };

    let penalty = take(outstanding.penalty);
    let interest = take(outstanding.interest);
    let principal = take(outstanding.principal);

    Ok(Allocation {
        penalty,
        interest,
        principal,
        overpayment: remaining,
    })
}

/// Outstanding left after an allocation is applied.
pub fn remaining_after(outstanding: &Outstanding, allocation: &Allocation) -> Outstanding {
    Outstanding {
        penalty: outstanding.penalty.max(Decimal::ZERO) - allocation.penalty,
        interest: outstanding.interest.max(Decimal::ZERO) - allocation.interest,
        principal: outstanding.principal.max(Decimal::ZERO) - allocation.principal,
    }
}

/// Allocate a payment and wrap the result in the standard envelope.
pub fn allocate_repayment(
    input: &AllocationInput,
) -> LoanbookResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let allocation = allocate(&input.outstanding, input.amount_paid)?;
    let remaining = remaining_after(&input.outstanding, &allocation);

    if allocation.overpayment > Decimal::ZERO {
        warnings.push(format!(
            "Payment exceeds outstanding by {}; overpayment is not applied to the loan",
            allocation.overpayment
        ));
    }
    for (name, bucket) in [
        ("penalty", input.outstanding.penalty),
        ("interest", input.outstanding.interest),
        ("principal", input.outstanding.principal),
    ] {
        if bucket < Decimal::ZERO {
            warnings.push(format!("Negative {name} outstanding treated as zero"));
        }
    }

    let output = AllocationOutput {
        allocation,
        fully_settled: remaining.is_settled(),
        remaining: remaining.into(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Repayment waterfall (penalty → interest → principal)",
        &serde_json::json!({
            "amount_paid": input.amount_paid.to_string(),
            "outstanding_total": input.outstanding.total().to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
