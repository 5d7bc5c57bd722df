mod common;

use std::sync::Barrier;
use std::thread;

use common::*;
use loanbook_core::config::{EngineConfig, RetryPolicy};
use loanbook_core::lending::{InterestType, PenaltyType};
use loanbook_core::loans::{LoanStatus, PaymentMethod, Repayment};
use loanbook_core::LoanbookResult;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn patient() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts: 200,
            backoff_ms: 1,
        },
        ..EngineConfig::default()
    }
}

#[test]
fn test_racing_repayments_serialize_on_the_loan() {
    for _ in 0..20 {
        let h = harness_with(patient());
        let product_id = h.add_product(product(
            InterestType::FlatMonthly,
            dec!(0.10),
            30,
            0,
            PenaltyType::Fixed,
            dec!(10),
        ));
        h.fund_cash(dec!(1000));
        let loan = h.active_loan(product_id, dec!(150), None);
        // Clear the interest so only the 150 principal remains
        h.service
            .record_repayment(loan.id, dec!(15), date(2024, 1, 2), PaymentMethod::Cash, "I")
            .unwrap();

        let loan_id = loan.id;
        let barrier = Barrier::new(2);
        let results: Vec<LoanbookResult<Repayment>> = thread::scope(|s| {
            let handles: Vec<_> = ["T1", "T2"]
                .into_iter()
                .map(|reference| {
                    let service = &h.service;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        service.record_repayment(
                            loan_id,
                            dec!(100),
                            date(2024, 1, 3),
                            PaymentMethod::Cash,
                            reference,
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let mut principal: Vec<Decimal> = results
            .into_iter()
            .map(|r| r.unwrap().allocation_principal)
            .collect();
        principal.sort();
        assert_eq!(principal, vec![dec!(50), dec!(100)]);

        let repayments = h.service.loan_repayments(loan.id).unwrap();
        let overpaid: Decimal = repayments.iter().map(|r| r.overpayment).sum();
        assert_eq!(overpaid, dec!(50));
        assert_eq!(h.service.get_loan(loan.id).unwrap().status, LoanStatus::Paid);
        assert_eq!(h.service.get_outstanding(loan.id).unwrap().total, Decimal::ZERO);
        // 1000 - 150 + 15 + 150
        assert_eq!(h.cash_balance(), dec!(1015));
        assert!(h
            .service
            .verify_account(h.service.chart().cash)
            .unwrap()
            .consistent);
    }
}

#[test]
fn test_parallel_postings_keep_balance_chain() {
    let h = harness_with(patient());
    let cash = h.service.chart().cash;

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10 {
                    h.service.fund_account(cash, dec!(2.50), "drip").unwrap();
                }
            });
        }
    });

    assert_eq!(h.cash_balance(), dec!(100.00));
    let verification = h.service.verify_account(cash).unwrap();
    assert!(verification.consistent);
    assert_eq!(verification.entry_count, 40);

    let mut codes: Vec<String> = h
        .service
        .journal()
        .unwrap()
        .into_iter()
        .map(|t| t.transaction_code)
        .collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 40);
    assert_eq!(h.vault_total(), Decimal::ZERO);
}
