use chrono::NaiveDate;
use loanbook_core::lending::allocator::{allocate, allocate_repayment, AllocationInput, Outstanding};
use loanbook_core::lending::calculator::{
    calculate_penalty, calculate_terms, compute_penalty, compute_terms, PenaltyInput, TermsInput,
};
use loanbook_core::lending::{InterestType, LoanProduct, PenaltyType};
use loanbook_core::LoanbookError;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn product(interest_type: InterestType, rate: Decimal, term: u32) -> LoanProduct {
    LoanProduct {
        id: Uuid::new_v4(),
        name: "Test".into(),
        interest_type,
        interest_rate: rate,
        max_amount: dec!(1_000_000),
        min_amount: Decimal::ZERO,
        default_term_days: term,
        grace_days: 7,
        penalty_type: PenaltyType::Percentage,
        penalty_value: dec!(0.05),
        is_active: true,
    }
}

// ===========================================================================
// Terms
// ===========================================================================

#[test]
fn test_flat_monthly_sixty_days() {
    let p = product(InterestType::FlatMonthly, dec!(0.25), 60);
    let terms = compute_terms(&p, dec!(1000), None).unwrap();
    // 1000 × 0.25 × 60 / 30
    assert_eq!(terms.interest_amount, dec!(500.00));
    assert_eq!(terms.total_due, dec!(1500.00));
    assert_eq!(terms.term_days, 60);
}

#[test]
fn test_reducing_balance_daily_approximation() {
    let p = product(InterestType::ReducingBalance, dec!(0.365), 30);
    let terms = compute_terms(&p, dec!(1000), None).unwrap();
    // 1000 × 0.365 × 30 / 365
    assert_eq!(terms.interest_amount, dec!(30.00));
}

#[test]
fn test_interest_rounds_half_up() {
    let p = product(InterestType::FlatMonthly, dec!(0.1), 30);
    // 10.05 × 0.1 = 1.005, a banker's round would give 1.00
    let terms = compute_terms(&p, dec!(10.05), None).unwrap();
    assert_eq!(terms.interest_amount, dec!(1.01));
    assert_eq!(terms.total_due, dec!(11.06));
    // 10.25 × 0.1 = 1.025
    let terms = compute_terms(&p, dec!(10.25), None).unwrap();
    assert_eq!(terms.interest_amount, dec!(1.03));
}

#[test]
fn test_principal_bounds() {
    let mut p = product(InterestType::FlatMonthly, dec!(0.2), 30);
    p.min_amount = dec!(50);
    assert!(matches!(
        compute_terms(&p, dec!(0), None),
        Err(LoanbookError::Validation { .. })
    ));
    assert!(matches!(
        compute_terms(&p, dec!(49.99), None),
        Err(LoanbookError::Validation { .. })
    ));
    assert!(matches!(
        compute_terms(&p, dec!(1_000_000.01), None),
        Err(LoanbookError::Validation { .. })
    ));
    assert!(compute_terms(&p, dec!(1_000_000), None).is_ok());
}

#[test]
fn test_inactive_product_rejected() {
    let mut p = product(InterestType::FlatMonthly, dec!(0.2), 30);
    p.is_active = false;
    assert!(compute_terms(&p, dec!(100), None).is_err());
}

#[test]
fn test_terms_envelope_reports_dates() {
    let input = TermsInput {
        product: product(InterestType::FlatMonthly, dec!(0.25), 60),
        principal: dec!(1000),
        term_days: Some(45),
        issue_date: NaiveDate::from_ymd_opt(2024, 1, 1),
    };
    let out = calculate_terms(&input).unwrap();
    assert_eq!(out.result.due_date, NaiveDate::from_ymd_opt(2024, 2, 15));
    assert_eq!(out.result.overdue_after, NaiveDate::from_ymd_opt(2024, 2, 22));
    assert_eq!(out.result.terms.interest_amount, dec!(375.00));
    assert!(!out.warnings.is_empty());
}

#[test]
fn test_terms_envelope_rejects_negative_rate() {
    let input = TermsInput {
        product: product(InterestType::FlatMonthly, dec!(-0.25), 60),
        principal: dec!(1000),
        term_days: None,
        issue_date: None,
    };
    assert!(matches!(
        calculate_terms(&input),
        Err(LoanbookError::Validation { ref field, .. }) if field == "interest_rate"
    ));
}

// ===========================================================================
// Penalties
// ===========================================================================

#[test]
fn test_penalty_waits_for_grace() {
    let p = product(InterestType::FlatMonthly, dec!(0.2), 30);
    assert_eq!(compute_penalty(&p, dec!(800), 7).unwrap(), Decimal::ZERO);
    assert_eq!(compute_penalty(&p, dec!(800), 8).unwrap(), dec!(40.00));
}

#[test]
fn test_fixed_penalty_ignores_base() {
    let mut p = product(InterestType::FlatMonthly, dec!(0.2), 30);
    p.penalty_type = PenaltyType::Fixed;
    p.penalty_value = dec!(25);
    assert_eq!(compute_penalty(&p, dec!(10), 30).unwrap(), dec!(25));
}

#[test]
fn test_penalty_envelope() {
    let input = PenaltyInput {
        product: product(InterestType::FlatMonthly, dec!(0.2), 30),
        base: dec!(333.33),
        days_overdue: 10,
    };
    let out = calculate_penalty(&input).unwrap();
    // 333.33 × 0.05 = 16.6665
    assert_eq!(out.result.penalty_amount, dec!(16.67));
    assert!(out.result.grace_elapsed);
}

#[test]
fn test_penalty_envelope_rejects_negative_value() {
    let mut p = product(InterestType::FlatMonthly, dec!(0.2), 30);
    p.penalty_type = PenaltyType::Fixed;
    p.penalty_value = dec!(-10);
    let input = PenaltyInput {
        product: p,
        base: dec!(500),
        days_overdue: 30,
    };
    assert!(matches!(
        calculate_penalty(&input),
        Err(LoanbookError::Validation { .. })
    ));
}

// ===========================================================================
// Allocation
// ===========================================================================

fn loan_800() -> Outstanding {
    Outstanding {
        penalty: dec!(50),
        interest: dec!(200),
        principal: dec!(800),
    }
}

#[test]
fn test_partial_payment_follows_waterfall() {
    let a = allocate(&loan_800(), dec!(300)).unwrap();
    assert_eq!(a.penalty, dec!(50));
    assert_eq!(a.interest, dec!(200));
    assert_eq!(a.principal, dec!(50));
    assert_eq!(a.overpayment, Decimal::ZERO);
}

#[test]
fn test_excess_payment_reports_overpayment() {
    let out = allocate_repayment(&AllocationInput {
        outstanding: loan_800(),
        amount_paid: dec!(1200),
    })
    .unwrap();
    let a = out.result.allocation;
    assert_eq!(a.principal, dec!(800));
    assert_eq!(a.overpayment, dec!(150));
    assert!(out.result.fully_settled);
    assert_eq!(out.result.remaining.total, Decimal::ZERO);
}

#[test]
fn test_non_positive_payment_rejected() {
    assert!(allocate(&loan_800(), Decimal::ZERO).is_err());
    assert!(allocate(&loan_800(), dec!(-5)).is_err());
}

fn cents() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|c| Decimal::new(c, 2))
}

proptest! {
    #[test]
    fn prop_allocation_is_complete(
        penalty in cents(),
        interest in cents(),
        principal in cents(),
        paid in (1i64..20_000_000).prop_map(|c| Decimal::new(c, 2)),
    ) {
        let outstanding = Outstanding { penalty, interest, principal };
        let a = allocate(&outstanding, paid).unwrap();
        prop_assert_eq!(a.penalty + a.interest + a.principal + a.overpayment, paid);
        prop_assert_eq!(a.penalty, paid.min(penalty));
        prop_assert!(a.interest <= interest && a.principal <= principal);
        prop_assert!(a.overpayment >= Decimal::ZERO);
        if a.principal > Decimal::ZERO {
            prop_assert_eq!(a.interest, interest);
        }
        prop_assert_eq!(allocate(&outstanding, paid).unwrap(), a);
    }

    #[test]
    fn prop_terms_are_deterministic(
        principal in (1i64..10_000_000).prop_map(|c| Decimal::new(c, 2)),
        rate_bp in 1i64..10_000,
        term in 1u32..720,
        flat in any::<bool>(),
    ) {
        let interest_type = if flat { InterestType::FlatMonthly } else { InterestType::ReducingBalance };
        let p = product(interest_type, Decimal::new(rate_bp, 4), term);
        let first = compute_terms(&p, principal, None).unwrap();
        let second = compute_terms(&p, principal, None).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.total_due, first.principal + first.interest_amount);
        prop_assert!(first.interest_amount.scale() <= 2);
    }
}
