#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use loanbook_core::config::EngineConfig;
use loanbook_core::lending::{InterestType, LoanProduct, PenaltyType};
use loanbook_core::loans::{Loan, PaymentMethod};
use loanbook_core::store::{Borrower, InMemoryReferenceData, Store};
use loanbook_core::{FixedClock, LoanAccountingService, Money, Rate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn product(
    interest_type: InterestType,
    interest_rate: Rate,
    default_term_days: u32,
    grace_days: u32,
    penalty_type: PenaltyType,
    penalty_value: Decimal,
) -> LoanProduct {
    LoanProduct {
        id: Uuid::new_v4(),
        name: format!("{interest_type:?} {interest_rate}"),
        interest_type,
        interest_rate,
        max_amount: dec!(100_000),
        min_amount: Decimal::ZERO,
        default_term_days,
        grace_days,
        penalty_type,
        penalty_value,
        is_active: true,
    }
}

pub struct Harness {
    pub service: LoanAccountingService,
    pub clock: Arc<FixedClock>,
    pub reference: Arc<InMemoryReferenceData>,
    pub borrower_id: Uuid,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let reference = Arc::new(InMemoryReferenceData::new(config.max_interest_rate));
    let borrower_id = Uuid::new_v4();
    reference
        .register_borrower(Borrower {
            id: borrower_id,
            full_name: "Grace N".into(),
            category: Some("market vendor".into()),
            credit_score: Some(640),
            is_active: true,
        })
        .unwrap();
    let clock = Arc::new(FixedClock::on(date(2024, 1, 1)));
    let service = LoanAccountingService::bootstrap(
        Arc::new(Store::new()),
        reference.clone(),
        config,
        clock.clone(),
    )
    .unwrap();
    Harness {
        service,
        clock,
        reference,
        borrower_id,
    }
}

impl Harness {
    pub fn add_product(&self, product: LoanProduct) -> Uuid {
        let id = product.id;
        self.reference.register_product(product).unwrap();
        id
    }

    pub fn fund_cash(&self, amount: Money) {
        let cash = self.service.chart().cash;
        self.service.fund_account(cash, amount, "seed").unwrap();
    }

    /// Create, approve and disburse a loan in cash.
    pub fn active_loan(&self, product_id: Uuid, principal: Money, term_days: Option<u32>) -> Loan {
        let loan = self
            .service
            .create_loan(self.borrower_id, product_id, principal, term_days, "officer")
            .unwrap();
        self.service.approve_loan(loan.id, "manager").unwrap();
        self.service
            .disburse_loan(loan.id, PaymentMethod::Cash, &format!("D-{}", loan.loan_number))
            .unwrap()
    }

    pub fn cash_balance(&self) -> Money {
        self.service
            .get_account_balance(self.service.chart().cash)
            .unwrap()
    }

    /// Sum of all vault balances; zero for a balanced book.
    pub fn vault_total(&self) -> Money {
        self.service
            .accounts()
            .unwrap()
            .iter()
            .map(|a| a.current_balance)
            .sum()
    }
}
