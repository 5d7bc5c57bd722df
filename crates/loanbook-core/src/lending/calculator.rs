use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LoanbookError;
use crate::lending::product::{InterestType, LoanProduct, PenaltyType, DEFAULT_MAX_INTEREST_RATE};
use crate::types::*;
use crate::LoanbookResult;

const DAYS_PER_MONTH: Decimal = dec!(30);
const DAYS_PER_YEAR: Decimal = dec!(365);

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Interest and total due fixed at loan creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    pub interest_rate: Rate,
    pub interest_amount: Money,
    pub total_due: Money,
    pub term_days: u32,
}

/// Standalone request for a terms quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsInput {
    pub product: LoanProduct,
    pub principal: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_days: Option<u32>,
    /// Optional issue date; when present the quote includes the due date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,
}

/// Terms quote with schedule dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsQuote {
    pub terms: LoanTerms,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overdue_after: Option<NaiveDate>,
}

/// Standalone request for a penalty quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyInput {
    pub product: LoanProduct,
    /// Outstanding principal (percentage penalties) or any base for fixed ones
    pub base: Money,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyQuote {
    pub penalty_amount: Money,
    pub grace_elapsed: bool,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Compute interest and total due for a principal under a product.
///
/// Flat monthly: `principal × rate × term_days / 30`.
/// Reducing balance (simplified daily-rate form, not amortised):
/// `principal × rate / 365 × term_days`.
/// The product is checked against the hard rate ceiling first.
/// Interest is rounded to cents half-up; `total_due = principal + interest`.
pub fn compute_terms(
    product: &LoanProduct,
    principal: Money,
    term_days_override: Option<u32>,
) -> LoanbookResult<LoanTerms> {
    product.validate(DEFAULT_MAX_INTEREST_RATE)?;
    if !product.is_active {
        return Err(LoanbookError::validation(
            "product",
            format!("Product '{}' is not active", product.name),
        ));
    }
    if principal <= Decimal::ZERO {
        return Err(LoanbookError::validation(
            "principal",
            "Principal must be positive",
        ));
    }
    if principal > product.max_amount {
        return Err(LoanbookError::validation(
            "principal",
            format!(
                "Principal {principal} exceeds product maximum {}",
                product.max_amount
            ),
        ));
    }
    if principal < product.min_amount {
        return Err(LoanbookError::validation(
            "principal",
            format!(
                "Principal {principal} is below product minimum {}",
                product.min_amount
            ),
        ));
    }
    if round_money(principal) != principal {
        return Err(LoanbookError::validation(
            "principal",
            "Principal carries more than 2 fraction digits",
        ));
    }

    let term_days = term_days_override.unwrap_or(product.default_term_days);
    if term_days == 0 {
        return Err(LoanbookError::validation(
            "term_days",
            "Term must be at least 1 day",
        ));
    }

    let days = Decimal::from(term_days);
    let raw_interest = match product.interest_type {
        InterestType::FlatMonthly => principal * product.interest_rate * days / DAYS_PER_MONTH,
        InterestType::ReducingBalance => {
            principal * product.interest_rate * days / DAYS_PER_YEAR
        }
    };
    let interest_amount = round_money(raw_interest);

    Ok(LoanTerms {
        principal,
        interest_rate: product.interest_rate,
        interest_amount,
        total_due: principal + interest_amount,
        term_days,
    })
}

/// Penalty owed after `days_overdue` days past the due date.
///
/// Nothing accrues inside the grace window. Afterwards a fixed penalty is
/// `penalty_value`, a percentage penalty is `base × penalty_value` in cents.
/// Charging at most once per overdue escalation is the caller's job.
pub fn compute_penalty(
    product: &LoanProduct,
    base: Money,
    days_overdue: i64,
) -> LoanbookResult<Money> {
    product.validate_penalty()?;
    if base < Decimal::ZERO {
        return Err(LoanbookError::validation(
            "base",
            "Penalty base cannot be negative",
        ));
    }
    if days_overdue <= product.grace_days as i64 {
        return Ok(Decimal::ZERO);
    }

    let amount = match product.penalty_type {
        PenaltyType::Fixed => product.penalty_value,
        PenaltyType::Percentage => base * product.penalty_value,
    };
    Ok(round_money(amount))
}

/// Due date for a loan issued on `issue_date`.
pub fn due_date(issue_date: NaiveDate, term_days: u32) -> LoanbookResult<NaiveDate> {
    issue_date
        .checked_add_days(Days::new(term_days as u64))
        .ok_or_else(|| LoanbookError::validation("term_days", "Due date out of calendar range"))
}

/// Last day inside the grace window; the loan is overdue strictly after it.
pub fn grace_end(due: NaiveDate, grace_days: u32) -> LoanbookResult<NaiveDate> {
    due.checked_add_days(Days::new(grace_days as u64))
        .ok_or_else(|| LoanbookError::validation("grace_days", "Grace end out of calendar range"))
}

/// Whole days elapsed past the due date (negative before it).
pub fn days_overdue(due: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - due).num_days()
}

/// Quote loan terms wrapped in the standard computation envelope.
pub fn calculate_terms(input: &TermsInput) -> LoanbookResult<ComputationOutput<TermsQuote>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let terms = compute_terms(&input.product, input.principal, input.term_days)?;
    if terms.term_days != input.product.default_term_days {
        warnings.push(format!(
            "Term of {} days overrides product default of {} days",
            terms.term_days, input.product.default_term_days
        ));
    }

    let (due, overdue_after) = match input.issue_date {
        Some(issued) => {
            let due = due_date(issued, terms.term_days)?;
            (Some(due), Some(grace_end(due, input.product.grace_days)?))
        }
        None => (None, None),
    };

    let methodology = match input.product.interest_type {
        InterestType::FlatMonthly => "Flat monthly interest (principal × rate × days / 30)",
        InterestType::ReducingBalance => {
            "Simplified reducing balance (principal × rate / 365 × days)"
        }
    };

    let quote = TermsQuote {
        terms,
        issue_date: input.issue_date,
        due_date: due,
        overdue_after,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "principal": input.principal.to_string(),
            "interest_rate": input.product.interest_rate.to_string(),
            "term_days": input.term_days,
            "rounding": "2dp half-up",
        }),
        warnings,
        elapsed,
        quote,
    ))
}

/// Quote a late penalty wrapped in the standard computation envelope.
pub fn calculate_penalty(input: &PenaltyInput) -> LoanbookResult<ComputationOutput<PenaltyQuote>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let penalty_amount = compute_penalty(&input.product, input.base, input.days_overdue)?;
    let grace_elapsed = input.days_overdue > input.product.grace_days as i64;
    if !grace_elapsed {
        warnings.push(format!(
            "{} day(s) overdue is within the {}-day grace period",
            input.days_overdue.max(0),
            input.product.grace_days
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Late penalty after grace period",
        &serde_json::json!({
            "penalty_type": input.product.penalty_type,
            "penalty_value": input.product.penalty_value.to_string(),
            "base": input.base.to_string(),
            "days_overdue": input.days_overdue,
        }),
        warnings,
        elapsed,
        PenaltyQuote {
            penalty_amount,
            grace_elapsed,
        },
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn flat_product() -> LoanProduct {
        LoanProduct {
            id: Uuid::new_v4(),
            name: "Flat 25".into(),
            interest_type: InterestType::FlatMonthly,
            interest_rate: dec!(0.25),
            max_amount: dec!(10000),
            min_amount: Decimal::ZERO,
            default_term_days: 60,
            grace_days: 5,
            penalty_type: PenaltyType::Fixed,
            penalty_value: dec!(50),
            is_active: true,
        }
    }

    #[test]
    fn test_flat_monthly_two_months() {
        let terms = compute_terms(&flat_product(), dec!(1000), None).unwrap();
        assert_eq!(terms.interest_amount, dec!(500.00));
        assert_eq!(terms.total_due, dec!(1500.00));
        assert_eq!(terms.term_days, 60);
    }

    #[test]
    fn test_flat_monthly_partial_month_rounds_half_up() {
        // 1000 × 0.25 × 7 / 30 = 58.3333...
        let terms = compute_terms(&flat_product(), dec!(1000), Some(7)).unwrap();
        assert_eq!(terms.interest_amount, dec!(58.33));
        assert_eq!(terms.total_due, dec!(1058.33));
    }

    #[test]
    fn test_reducing_balance_daily_rate() {
        let mut p = flat_product();
        p.interest_type = InterestType::ReducingBalance;
        p.interest_rate = dec!(0.365);
        // 1000 × 0.365 / 365 × 30 = 30
        let terms = compute_terms(&p, dec!(1000), Some(30)).unwrap();
        assert_eq!(terms.interest_amount, dec!(30.00));
    }

    #[test]
    fn test_principal_above_max_rejected() {
        let err = compute_terms(&flat_product(), dec!(10000.01), None).unwrap_err();
        assert!(matches!(err, LoanbookError::Validation { ref field, .. } if field == "principal"));
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut p = flat_product();
        p.is_active = false;
        assert!(compute_terms(&p, dec!(100), None).is_err());
    }

    #[test]
    fn test_zero_term_override_rejected() {
        assert!(compute_terms(&flat_product(), dec!(100), Some(0)).is_err());
    }

    #[test]
    fn test_fixed_penalty_after_grace() {
        let p = flat_product();
        assert_eq!(compute_penalty(&p, dec!(800), 5).unwrap(), Decimal::ZERO);
        assert_eq!(compute_penalty(&p, dec!(800), 6).unwrap(), dec!(50));
    }

    #[test]
    fn test_percentage_penalty_on_base() {
        let mut p = flat_product();
        p.penalty_type = PenaltyType::Percentage;
        p.penalty_value = dec!(0.05);
        assert_eq!(compute_penalty(&p, dec!(833.33), 30).unwrap(), dec!(41.67));
    }

    #[test]
    fn test_rate_outside_ceiling_rejected() {
        let mut p = flat_product();
        p.interest_rate = dec!(-0.25);
        let err = compute_terms(&p, dec!(1000), None).unwrap_err();
        assert!(matches!(err, LoanbookError::Validation { ref field, .. } if field == "interest_rate"));
        p.interest_rate = dec!(5.01);
        assert!(matches!(
            compute_terms(&p, dec!(1000), None),
            Err(LoanbookError::Validation { .. })
        ));
    }

    #[test]
    fn test_negative_penalty_value_rejected() {
        let mut p = flat_product();
        p.penalty_value = dec!(-50);
        let err = compute_penalty(&p, dec!(800), 30).unwrap_err();
        assert!(matches!(err, LoanbookError::Validation { ref field, .. } if field == "penalty_value"));
    }

    #[test]
    fn test_due_date_and_grace() {
        let issued = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let due = due_date(issued, 60).unwrap();
        assert_eq!(due, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(
            grace_end(due, 5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
        );
        assert_eq!(days_overdue(due, NaiveDate::from_ymd_opt(2026, 3, 8).unwrap()), 6);
    }

    #[test]
    fn test_calculate_terms_envelope_warns_on_override() {
        let input = TermsInput {
            product: flat_product(),
            principal: dec!(1000),
            term_days: Some(30),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 1),
        };
        let out = calculate_terms(&input).unwrap();
        assert_eq!(out.result.terms.interest_amount, dec!(250.00));
        assert_eq!(out.result.due_date, NaiveDate::from_ymd_opt(2026, 1, 31));
        assert_eq!(out.warnings.len(), 1);
    }
}
