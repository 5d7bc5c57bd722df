//! Loan accounting service.
//!
//! The only entry point for state changes. Every mutating operation runs as
//! one unit of work: begin, operate, commit. A stale read at commit re-runs
//! the whole operation (calculators are pure, so recomputation is safe) up
//! to `retry.max_attempts` times.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LoanbookError;
use crate::ledger::account::{
    AccountType, EntryRequest, TransactionType, VaultAccount, VaultChart, VaultTransaction,
    VaultTransactionEntry,
};
use crate::ledger::vault::{verify_account, AccountVerification, PostingRequest, VaultLedger};
use crate::lending::allocator::OutstandingSummary;
use crate::lending::calculator::compute_terms;
use crate::loans::model::{Loan, LoanStatusChange, PaymentMethod, Penalty, Repayment};
use crate::loans::state_machine::{
    outstanding_from, LoanStateMachine, LoanStatus, OverdueEvaluation,
};
use crate::store::{ReferenceData, Store, UnitOfWork};
use crate::types::*;
use crate::LoanbookResult;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of timestamps and business dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for scenarios and tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Midnight UTC on the given date.
    pub fn on(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.set(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    pub fn advance_days(&self, days: u64) {
        let now = self.now();
        self.set(now.checked_add_days(Days::new(days)).unwrap_or(now));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct LoanAccountingService {
    store: Arc<Store>,
    reference: Arc<dyn ReferenceData>,
    config: EngineConfig,
    ledger: VaultLedger,
    chart: VaultChart,
    clock: Arc<dyn Clock>,
}

fn require_amount(field: &str, amount: Money) -> LoanbookResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LoanbookError::validation(field, "Amount must be positive"));
    }
    if round_money(amount) != amount {
        return Err(LoanbookError::validation(
            field,
            "Amount carries more than 2 fraction digits",
        ));
    }
    Ok(())
}

impl LoanAccountingService {
    /// Build a service over a store, opening the default chart of accounts
    /// or reusing one already present.
    pub fn bootstrap(
        store: Arc<Store>,
        reference: Arc<dyn ReferenceData>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> LoanbookResult<Self> {
        config.validate()?;
        let ledger = VaultLedger::new(config.codes.clone());
        let mut service = Self {
            store,
            reference,
            config,
            ledger,
            // Placeholder until the chart is opened below
            chart: VaultChart {
                cash: Uuid::nil(),
                bank: Uuid::nil(),
                mobile_money: Uuid::nil(),
                loan_fund: Uuid::nil(),
                interest_income: Uuid::nil(),
                penalty_income: Uuid::nil(),
                operating_expense: Uuid::nil(),
                capital: Uuid::nil(),
            },
            clock,
        };
        service.chart = service.open_default_chart()?;
        Ok(service)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn chart(&self) -> &VaultChart {
        &self.chart
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn machine(&self) -> LoanStateMachine<'_> {
        LoanStateMachine::new(&self.ledger, &self.chart, &self.config.codes)
    }

    /// Run `work` in a fresh unit of work and commit it, retrying the whole
    /// closure on optimistic conflicts.
    fn with_retry<T>(
        &self,
        operation: &str,
        mut work: impl FnMut(&mut UnitOfWork<'_>, DateTime<Utc>) -> LoanbookResult<T>,
    ) -> LoanbookResult<T> {
        let policy = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut uow = self.store.begin();
            let at = self.clock.now();
            let result = work(&mut uow, at).and_then(|value| uow.commit().map(|()| value));

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Committed after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    if attempt >= policy.max_attempts {
                        warn!(operation, attempts = attempt, error = %e, "Retry budget exhausted");
                        return Err(LoanbookError::Concurrency {
                            operation: operation.to_string(),
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    warn!(operation, attempt, error = %e, "Optimistic conflict, retrying");
                    thread::sleep(policy.backoff(attempt));
                }
                Err(e) => {
                    if let LoanbookError::ConstraintViolation(reason) = &e {
                        error!(operation, %reason, "Ledger constraint violated");
                    }
                    return Err(e);
                }
            }
        }
    }

    // -- chart of accounts --------------------------------------------------

    pub fn open_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> LoanbookResult<VaultAccount> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LoanbookError::validation("code", "Account code cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(LoanbookError::validation("name", "Account name cannot be empty"));
        }
        let account = self.with_retry("open_account", |uow, at| {
            if uow.account_code_taken(code)? {
                return Err(LoanbookError::Conflict(format!(
                    "Account code {code} is already in use"
                )));
            }
            uow.put_account(VaultAccount::open(code, name, account_type, at))
        })?;
        info!(code, account_type = %account_type, "Vault account opened");
        Ok(account)
    }

    /// Open every default account whose code is not yet taken and return the
    /// resulting chart.
    pub fn open_default_chart(&self) -> LoanbookResult<VaultChart> {
        let by_type = self.with_retry("open_default_chart", |uow, at| {
            let mut by_type: HashMap<AccountType, Uuid> = HashMap::new();
            for (code, name, account_type) in VaultChart::DEFAULTS {
                let id = match self.store.account_by_code(code)? {
                    Some(existing) if existing.account_type == account_type => existing.id,
                    Some(existing) => {
                        return Err(LoanbookError::Conflict(format!(
                            "Account {code} exists with type {}, expected {account_type}",
                            existing.account_type
                        )))
                    }
                    None => {
                        uow.put_account(VaultAccount::open(code, name, account_type, at))?
                            .id
                    }
                };
                by_type.insert(account_type, id);
            }
            Ok(by_type)
        })?;

        let pick = |account_type: AccountType| {
            by_type
                .get(&account_type)
                .copied()
                .ok_or_else(|| LoanbookError::not_found("Vault account", account_type))
        };
        Ok(VaultChart {
            cash: pick(AccountType::Cash)?,
            bank: pick(AccountType::Bank)?,
            mobile_money: pick(AccountType::MobileMoney)?,
            loan_fund: pick(AccountType::LoanFund)?,
            interest_income: pick(AccountType::InterestIncome)?,
            penalty_income: pick(AccountType::PenaltyIncome)?,
            operating_expense: pick(AccountType::OperatingExpense)?,
            capital: pick(AccountType::Capital)?,
        })
    }

    fn channel(&self, uow: &mut UnitOfWork<'_>, account_id: Uuid) -> LoanbookResult<VaultAccount> {
        let account = uow.account(account_id)?;
        if !account.account_type.is_channel() {
            return Err(LoanbookError::validation(
                "account",
                format!(
                    "Account {} ({}) is not a cash, bank or mobile money channel",
                    account.code, account.account_type
                ),
            ));
        }
        Ok(account)
    }

    // -- vault operations ---------------------------------------------------

    /// Inject owner capital into a channel account.
    pub fn fund_account(
        &self,
        channel: Uuid,
        amount: Money,
        reference: &str,
    ) -> LoanbookResult<VaultTransaction> {
        require_amount("amount", amount)?;
        self.with_retry("fund_account", |uow, at| {
            let account = self.channel(uow, channel)?;
            self.ledger.post(
                uow,
                PostingRequest {
                    transaction_type: TransactionType::CapitalInjection,
                    entries: vec![
                        EntryRequest::debit(self.chart.capital, amount),
                        EntryRequest::credit(account.id, amount),
                    ],
                    loan_id: None,
                    repayment_id: None,
                    description: format!("Capital injection {reference} into {}", account.code),
                },
                at,
            )
        })
    }

    pub fn record_expense(
        &self,
        channel: Uuid,
        amount: Money,
        description: &str,
    ) -> LoanbookResult<VaultTransaction> {
        require_amount("amount", amount)?;
        self.with_retry("record_expense", |uow, at| {
            let account = self.channel(uow, channel)?;
            self.ledger.post(
                uow,
                PostingRequest {
                    transaction_type: TransactionType::Expense,
                    entries: vec![
                        EntryRequest::debit(account.id, amount),
                        EntryRequest::credit(self.chart.operating_expense, amount),
                    ],
                    loan_id: None,
                    repayment_id: None,
                    description: description.to_string(),
                },
                at,
            )
        })
    }

    pub fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: Money,
        description: &str,
    ) -> LoanbookResult<VaultTransaction> {
        require_amount("amount", amount)?;
        if from == to {
            return Err(LoanbookError::validation(
                "to",
                "Transfer source and destination must differ",
            ));
        }
        self.with_retry("transfer", |uow, at| {
            let source = self.channel(uow, from)?;
            let destination = self.channel(uow, to)?;
            self.ledger.post(
                uow,
                PostingRequest {
                    transaction_type: TransactionType::Transfer,
                    entries: vec![
                        EntryRequest::debit(source.id, amount),
                        EntryRequest::credit(destination.id, amount),
                    ],
                    loan_id: None,
                    repayment_id: None,
                    description: description.to_string(),
                },
                at,
            )
        })
    }

    // -- loan lifecycle -----------------------------------------------------

    pub fn create_loan(
        &self,
        borrower_id: Uuid,
        product_id: Uuid,
        principal: Money,
        term_days_override: Option<u32>,
        created_by: &str,
    ) -> LoanbookResult<Loan> {
        let borrower = self.reference.borrower(borrower_id)?;
        if !borrower.is_active {
            return Err(LoanbookError::validation(
                "borrower_id",
                format!("Borrower {} is not active", borrower.full_name),
            ));
        }
        let product = self.reference.product(product_id)?;
        let terms = compute_terms(&product, principal, term_days_override)?;

        let loan = self.with_retry("create_loan", |uow, at| {
            self.machine().open(
                uow,
                &terms,
                &product,
                borrower_id,
                created_by,
                at.date_naive(),
                at,
            )
        })?;
        info!(
            loan = %loan.loan_number,
            borrower = %borrower_id,
            principal = %loan.principal_amount,
            total_due = %loan.total_due_amount,
            "Loan created"
        );
        Ok(loan)
    }

    pub fn approve_loan(&self, loan_id: Uuid, approver: &str) -> LoanbookResult<Loan> {
        self.with_retry("approve_loan", |uow, at| {
            self.machine().approve(uow, loan_id, approver, at)
        })
    }

    pub fn reject_loan(&self, loan_id: Uuid, actor: &str, reason: &str) -> LoanbookResult<Loan> {
        self.with_retry("reject_loan", |uow, at| {
            self.machine().reject(uow, loan_id, actor, reason, at)
        })
    }

    pub fn disburse_loan(
        &self,
        loan_id: Uuid,
        method: PaymentMethod,
        reference: &str,
    ) -> LoanbookResult<Loan> {
        self.with_retry("disburse_loan", |uow, at| {
            self.machine().disburse(uow, loan_id, method, reference, at)
        })
    }

    pub fn record_repayment(
        &self,
        loan_id: Uuid,
        amount_paid: Money,
        payment_date: NaiveDate,
        method: PaymentMethod,
        reference: &str,
    ) -> LoanbookResult<Repayment> {
        self.with_retry("record_repayment", |uow, at| {
            self.machine()
                .apply_repayment(uow, loan_id, amount_paid, payment_date, method, reference, at)
        })
    }

    pub fn evaluate_overdue(
        &self,
        loan_id: Uuid,
        as_of: NaiveDate,
    ) -> LoanbookResult<OverdueEvaluation> {
        let loan = self.store.loan(loan_id)?;
        let product = self.reference.product(loan.product_id)?;
        self.with_retry("evaluate_overdue", |uow, at| {
            self.machine()
                .evaluate_overdue(uow, loan_id, &product, as_of, at)
        })
    }

    /// Evaluate every active loan; returns the evaluations that moved a loan
    /// to `overdue`. A loan that fails evaluation is logged and skipped so
    /// the rest of the book is still swept.
    pub fn evaluate_all_overdue(&self, as_of: NaiveDate) -> LoanbookResult<Vec<OverdueEvaluation>> {
        let mut transitioned = Vec::new();
        let mut failed = 0usize;
        for loan in self.store.loans()? {
            if loan.status != LoanStatus::Active {
                continue;
            }
            match self.evaluate_overdue(loan.id, as_of) {
                Ok(evaluation) if evaluation.transitioned => transitioned.push(evaluation),
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    error!(loan = %loan.loan_number, error = %e, "Overdue evaluation failed");
                }
            }
        }
        if failed > 0 {
            warn!(%as_of, failed, transitioned = transitioned.len(), "Overdue sweep skipped loans");
        }
        Ok(transitioned)
    }

    pub fn waive_penalty(
        &self,
        penalty_id: Uuid,
        waived_by: &str,
        reason: &str,
    ) -> LoanbookResult<Penalty> {
        self.with_retry("waive_penalty", |uow, at| {
            self.machine()
                .waive_penalty(uow, penalty_id, waived_by, reason, at)
        })
    }

    pub fn write_off_loan(&self, loan_id: Uuid, approver: &str) -> LoanbookResult<Loan> {
        self.with_retry("write_off_loan", |uow, at| {
            self.machine().write_off(uow, loan_id, approver, at)
        })
    }

    // -- queries ------------------------------------------------------------

    pub fn get_loan(&self, loan_id: Uuid) -> LoanbookResult<Loan> {
        self.store.loan(loan_id)
    }

    pub fn loans(&self) -> LoanbookResult<Vec<Loan>> {
        self.store.loans()
    }

    pub fn get_outstanding(&self, loan_id: Uuid) -> LoanbookResult<OutstandingSummary> {
        let loan = self.store.loan(loan_id)?;
        let penalties = self.store.penalties_for_loan(loan_id)?;
        let repayments = self.store.repayments_for_loan(loan_id)?;
        Ok(outstanding_from(&loan, &penalties, &repayments).into())
    }

    pub fn loan_repayments(&self, loan_id: Uuid) -> LoanbookResult<Vec<Repayment>> {
        self.store.loan(loan_id)?;
        self.store.repayments_for_loan(loan_id)
    }

    pub fn loan_penalties(&self, loan_id: Uuid) -> LoanbookResult<Vec<Penalty>> {
        self.store.loan(loan_id)?;
        self.store.penalties_for_loan(loan_id)
    }

    pub fn loan_history(&self, loan_id: Uuid) -> LoanbookResult<Vec<LoanStatusChange>> {
        self.store.loan(loan_id)?;
        self.store.history_for_loan(loan_id)
    }

    pub fn get_account(&self, account_id: Uuid) -> LoanbookResult<VaultAccount> {
        self.store.account(account_id)
    }

    pub fn get_account_balance(&self, account_id: Uuid) -> LoanbookResult<Money> {
        Ok(self.store.account(account_id)?.current_balance)
    }

    pub fn accounts(&self) -> LoanbookResult<Vec<VaultAccount>> {
        self.store.accounts()
    }

    /// Entries of one account in creation order.
    pub fn account_statement(&self, account_id: Uuid) -> LoanbookResult<Vec<VaultTransactionEntry>> {
        self.store.account(account_id)?;
        let mut entries = self.store.entries_for_account(account_id)?;
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    pub fn verify_account(&self, account_id: Uuid) -> LoanbookResult<AccountVerification> {
        let account = self.store.account(account_id)?;
        let entries = self.store.entries_for_account(account_id)?;
        let verification = verify_account(&account, &entries);
        if !verification.consistent {
            error!(
                account = %account.code,
                replayed = %verification.replayed_balance,
                stored = %verification.current_balance,
                "Account failed verification"
            );
        }
        Ok(verification)
    }

    pub fn journal(&self) -> LoanbookResult<Vec<VaultTransaction>> {
        self.store.transactions()
    }

    pub fn transaction_entries(
        &self,
        transaction_id: Uuid,
    ) -> LoanbookResult<Vec<VaultTransactionEntry>> {
        self.store.transaction(transaction_id)?;
        self.store.entries_for_transaction(transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::TransactionStatus;
    use crate::lending::product::{InterestType, LoanProduct, PenaltyType};
    use crate::store::{Borrower, InMemoryReferenceData};
    use rust_decimal_macros::dec;

    fn fixture() -> (LoanAccountingService, Uuid, Uuid) {
        let reference = InMemoryReferenceData::new(dec!(5.0));
        let product = LoanProduct {
            id: Uuid::new_v4(),
            name: "Monthly 25".into(),
            interest_type: InterestType::FlatMonthly,
            interest_rate: dec!(0.25),
            max_amount: dec!(10000),
            min_amount: Decimal::ZERO,
            default_term_days: 30,
            grace_days: 3,
            penalty_type: PenaltyType::Fixed,
            penalty_value: dec!(50),
            is_active: true,
        };
        let borrower = Borrower {
            id: Uuid::new_v4(),
            full_name: "Amina K".into(),
            category: None,
            credit_score: None,
            is_active: true,
        };
        let (product_id, borrower_id) = (product.id, borrower.id);
        reference.register_product(product).unwrap();
        reference.register_borrower(borrower).unwrap();
        let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let service = LoanAccountingService::bootstrap(
            Arc::new(Store::new()),
            Arc::new(reference),
            EngineConfig::default(),
            clock,
        )
        .unwrap();
        (service, product_id, borrower_id)
    }

    #[test]
    fn test_bootstrap_reuses_existing_chart() {
        let (service, _, _) = fixture();
        let again = LoanAccountingService::bootstrap(
            service.store().clone(),
            Arc::new(InMemoryReferenceData::new(dec!(5.0))),
            EngineConfig::default(),
            Arc::new(SystemClock),
        )
        .unwrap();
        assert_eq!(again.chart(), service.chart());
        assert_eq!(service.accounts().unwrap().len(), 8);
    }

    #[test]
    fn test_fund_requires_channel() {
        let (service, _, _) = fixture();
        let err = service
            .fund_account(service.chart().loan_fund, dec!(100), "seed")
            .unwrap_err();
        assert!(matches!(err, LoanbookError::Validation { .. }));
    }

    #[test]
    fn test_create_loan_snapshots_terms() {
        let (service, product_id, borrower_id) = fixture();
        let loan = service
            .create_loan(borrower_id, product_id, dec!(1000), Some(60), "officer")
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Draft);
        assert_eq!(loan.loan_number, "LN-000001");
        assert_eq!(loan.interest_amount, dec!(500));
        assert_eq!(loan.total_due_amount, dec!(1500));
        assert_eq!(service.loan_history(loan.id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_borrower_not_found() {
        let (service, product_id, _) = fixture();
        let err = service
            .create_loan(Uuid::new_v4(), product_id, dec!(100), None, "officer")
            .unwrap_err();
        assert!(matches!(err, LoanbookError::NotFound { .. }));
    }

    #[test]
    fn test_transfer_between_channels() {
        let (service, _, _) = fixture();
        let chart = *service.chart();
        service.fund_account(chart.cash, dec!(300), "seed").unwrap();
        service
            .transfer(chart.cash, chart.bank, dec!(120.50), "bank deposit")
            .unwrap();
        assert_eq!(service.get_account_balance(chart.cash).unwrap(), dec!(179.50));
        assert_eq!(service.get_account_balance(chart.bank).unwrap(), dec!(120.50));
        assert!(service.verify_account(chart.cash).unwrap().consistent);
    }

    #[test]
    fn test_returned_transaction_matches_journal() {
        let (service, _, _) = fixture();
        let chart = *service.chart();
        let funded = service.fund_account(chart.cash, dec!(10), "seed").unwrap();
        let spent = service.record_expense(chart.cash, dec!(4), "airtime").unwrap();
        let moved = service.transfer(chart.cash, chart.bank, dec!(6), "deposit").unwrap();
        let journal = service.journal().unwrap();
        assert_eq!(journal.len(), 3);
        for (returned, stored) in [funded, spent, moved].iter().zip(&journal) {
            assert_eq!(returned.id, stored.id);
            assert_eq!(returned.status, stored.status);
            assert_eq!(returned.status, TransactionStatus::Completed);
        }
    }

    #[test]
    fn test_overdue_sweep_skips_failing_loan() {
        let (service, product_id, borrower_id) = fixture();
        let chart = *service.chart();
        service.fund_account(chart.cash, dec!(1000), "seed").unwrap();

        // A second engine over the same book that no longer knows the first
        // loan's product.
        let live = service.reference.product(product_id).unwrap();
        let retired = LoanProduct {
            id: Uuid::new_v4(),
            name: "Retired".into(),
            ..live.clone()
        };
        let full = InMemoryReferenceData::new(dec!(5.0));
        full.register_product(live.clone()).unwrap();
        full.register_product(retired.clone()).unwrap();
        full.register_borrower(service.reference.borrower(borrower_id).unwrap())
            .unwrap();
        let lender = LoanAccountingService::bootstrap(
            service.store().clone(),
            Arc::new(full),
            EngineConfig::default(),
            service.clock().clone(),
        )
        .unwrap();
        let mut ids = Vec::new();
        for pid in [retired.id, live.id] {
            let loan = lender
                .create_loan(borrower_id, pid, dec!(100), None, "officer")
                .unwrap();
            lender.approve_loan(loan.id, "manager").unwrap();
            lender.disburse_loan(loan.id, PaymentMethod::Cash, "").unwrap();
            ids.push(loan.id);
        }

        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let swept = service.evaluate_all_overdue(as_of).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].loan_id, ids[1]);
        assert_eq!(service.get_loan(ids[0]).unwrap().status, LoanStatus::Active);
        assert_eq!(service.get_loan(ids[1]).unwrap().status, LoanStatus::Overdue);
    }

    #[test]
    fn test_retry_budget_exhaustion_is_concurrency() {
        let (service, _, _) = fixture();
        let mut calls = 0;
        let err = service
            .with_retry("probe", |_, _| {
                calls += 1;
                Err::<(), _>(LoanbookError::VersionConflict {
                    entity: "loan".into(),
                    id: "x".into(),
                    expected: 1,
                    found: 2,
                })
            })
            .unwrap_err();
        assert_eq!(calls, 5);
        match err {
            LoanbookError::Concurrency {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "probe");
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 1, 30).unwrap());
        clock.advance_days(3);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
    }
}
