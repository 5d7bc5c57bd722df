//! Loan lifecycle.
//!
//! ```text
//! draft     -> approved | rejected
//! approved  -> disbursed | rejected
//! disbursed -> active
//! active    -> overdue | paid | written_off
//! overdue   -> paid | written_off
//! ```
//! `paid`, `written_off` and `rejected` are terminal. Every operation here
//! works inside a caller-supplied unit of work and stages nothing until all
//! of its checks have passed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::CodeFormat;
use crate::error::LoanbookError;
use crate::ledger::account::{EntryRequest, TransactionType, VaultChart};
use crate::ledger::vault::{PostingRequest, VaultLedger};
use crate::lending::allocator::{allocate, remaining_after, Outstanding};
use crate::lending::calculator::{compute_penalty, days_overdue, due_date, LoanTerms};
use crate::lending::product::LoanProduct;
use crate::loans::model::{
    Disbursement, Loan, LoanStatusChange, PaymentMethod, Penalty, Repayment,
};
use crate::store::{Sequence, UnitOfWork};
use crate::types::*;
use crate::LoanbookResult;

/// Actor recorded on transitions made by the engine itself.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Draft,
    Approved,
    Disbursed,
    Active,
    Overdue,
    Paid,
    WrittenOff,
    Rejected,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 8] = [
        LoanStatus::Draft,
        LoanStatus::Approved,
        LoanStatus::Disbursed,
        LoanStatus::Active,
        LoanStatus::Overdue,
        LoanStatus::Paid,
        LoanStatus::WrittenOff,
        LoanStatus::Rejected,
    ];

    pub fn allowed_transitions(&self) -> &'static [LoanStatus] {
        use LoanStatus::*;
        match self {
            Draft => &[Approved, Rejected],
            Approved => &[Disbursed, Rejected],
            Disbursed => &[Active],
            Active => &[Overdue, Paid, WrittenOff],
            Overdue => &[Paid, WrittenOff],
            Paid | WrittenOff | Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Only loans with money out may take repayments.
    pub fn accepts_repayment(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Draft => "draft",
            LoanStatus::Approved => "approved",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Active => "active",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Paid => "paid",
            LoanStatus::WrittenOff => "written_off",
            LoanStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an overdue check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueEvaluation {
    pub loan_id: Uuid,
    pub status: LoanStatus,
    pub transitioned: bool,
    pub days_overdue: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty: Option<Penalty>,
}

/// Per-bucket outstanding from contract amounts, unwaived penalties and
/// prior allocations. Buckets may come out negative (e.g. a penalty waived
/// after part of it was collected); the allocator treats those as zero.
pub fn outstanding_from(loan: &Loan, penalties: &[Penalty], repayments: &[Repayment]) -> Outstanding {
    let accrued_penalty: Money = penalties
        .iter()
        .filter(|p| !p.is_waived)
        .map(|p| p.amount)
        .sum();
    let paid_penalty: Money = repayments.iter().map(|r| r.allocation_penalty).sum();
    let paid_interest: Money = repayments.iter().map(|r| r.allocation_interest).sum();
    let paid_principal: Money = repayments.iter().map(|r| r.allocation_principal).sum();

    Outstanding {
        penalty: accrued_penalty - paid_penalty,
        interest: loan.interest_amount - paid_interest,
        principal: loan.principal_amount - paid_principal,
    }
}

fn invalid(loan: &Loan, to: impl fmt::Display) -> LoanbookError {
    LoanbookError::InvalidStateTransition {
        loan_id: loan.id,
        from: loan.status.to_string(),
        to: to.to_string(),
    }
}

/// Validates and applies loan transitions, posting to the vault where a
/// transition moves money.
pub struct LoanStateMachine<'a> {
    ledger: &'a VaultLedger,
    chart: &'a VaultChart,
    codes: &'a CodeFormat,
}

impl<'a> LoanStateMachine<'a> {
    pub fn new(ledger: &'a VaultLedger, chart: &'a VaultChart, codes: &'a CodeFormat) -> Self {
        Self {
            ledger,
            chart,
            codes,
        }
    }

    fn transition(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan: &mut Loan,
        to: LoanStatus,
        actor: &str,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> LoanbookResult<()> {
        if !loan.status.can_transition_to(to) {
            return Err(invalid(loan, to));
        }
        uow.record_transition(LoanStatusChange {
            loan_id: loan.id,
            from: Some(loan.status),
            to,
            actor: actor.to_string(),
            at,
            note,
        });
        info!(loan = %loan.loan_number, from = %loan.status, to = %to, actor, "Loan transition");
        loan.status = to;
        loan.updated_at = at;
        Ok(())
    }

    /// Stage a new draft loan carrying the computed terms.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &self,
        uow: &mut UnitOfWork<'_>,
        terms: &LoanTerms,
        product: &LoanProduct,
        borrower_id: Uuid,
        created_by: &str,
        issue_date: NaiveDate,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Loan> {
        let seq = uow.next_sequence(Sequence::Loan)?;
        let loan = Loan {
            id: Uuid::new_v4(),
            loan_number: self.codes.format(&self.codes.loan_prefix, seq),
            borrower_id,
            product_id: product.id,
            principal_amount: terms.principal,
            interest_rate: terms.interest_rate,
            interest_type: product.interest_type,
            interest_amount: terms.interest_amount,
            total_due_amount: terms.total_due,
            term_days: terms.term_days,
            grace_days: product.grace_days,
            issue_date,
            due_date: due_date(issue_date, terms.term_days)?,
            status: LoanStatus::Draft,
            created_by: created_by.to_string(),
            created_at: at,
            approved_by: None,
            approved_at: None,
            disbursement: None,
            written_off_by: None,
            written_off_at: None,
            closed_at: None,
            updated_at: at,
            version: 0,
        };
        uow.record_transition(LoanStatusChange {
            loan_id: loan.id,
            from: None,
            to: LoanStatus::Draft,
            actor: created_by.to_string(),
            at,
            note: None,
        });
        uow.put_loan(loan)
    }

    pub fn approve(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan_id: Uuid,
        approver: &str,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Loan> {
        let mut loan = uow.loan(loan_id)?;
        self.transition(uow, &mut loan, LoanStatus::Approved, approver, at, None)?;
        loan.approved_by = Some(approver.to_string());
        loan.approved_at = Some(at);
        uow.put_loan(loan)
    }

    pub fn reject(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan_id: Uuid,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Loan> {
        if reason.trim().is_empty() {
            return Err(LoanbookError::validation(
                "reason",
                "A rejection reason is required",
            ));
        }
        let mut loan = uow.loan(loan_id)?;
        self.transition(
            uow,
            &mut loan,
            LoanStatus::Rejected,
            actor,
            at,
            Some(reason.to_string()),
        )?;
        loan.closed_at = Some(at);
        uow.put_loan(loan)
    }

    /// Pay out the principal and activate the loan. The schedule is
    /// re-anchored on the disbursement date.
    pub fn disburse(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan_id: Uuid,
        method: PaymentMethod,
        reference: &str,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Loan> {
        let mut loan = uow.loan(loan_id)?;
        if !loan.status.can_transition_to(LoanStatus::Disbursed) {
            return Err(invalid(&loan, LoanStatus::Disbursed));
        }

        let channel = self.chart.account_for(method.account_type());
        let transaction = self.ledger.post(
            uow,
            PostingRequest {
                transaction_type: TransactionType::LoanDisbursement,
                entries: vec![
                    EntryRequest::debit(channel, loan.principal_amount),
                    EntryRequest::credit(self.chart.loan_fund, loan.principal_amount),
                ],
                loan_id: Some(loan.id),
                repayment_id: None,
                description: format!("Disbursement of loan {}", loan.loan_number),
            },
            at,
        )?;

        self.transition(uow, &mut loan, LoanStatus::Disbursed, SYSTEM_ACTOR, at, None)?;
        loan.issue_date = at.date_naive();
        loan.due_date = due_date(loan.issue_date, loan.term_days)?;
        loan.disbursement = Some(Disbursement {
            method,
            reference: reference.to_string(),
            disbursed_at: at,
            transaction_id: transaction.id,
        });
        self.transition(uow, &mut loan, LoanStatus::Active, SYSTEM_ACTOR, at, None)?;
        uow.put_loan(loan)
    }

    pub fn outstanding(&self, uow: &mut UnitOfWork<'_>, loan: &Loan) -> LoanbookResult<Outstanding> {
        let penalties = uow.loan_penalties(loan.id)?;
        let repayments = uow.loan_repayments(loan.id)?;
        Ok(outstanding_from(loan, &penalties, &repayments))
    }

    /// Allocate a payment through the waterfall, post it, record it and
    /// settle the loan when nothing remains.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_repayment(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan_id: Uuid,
        amount_paid: Money,
        payment_date: NaiveDate,
        method: PaymentMethod,
        reference: &str,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Repayment> {
        if amount_paid <= Decimal::ZERO {
            return Err(LoanbookError::validation(
                "amount_paid",
                "Payment amount must be positive",
            ));
        }
        if round_money(amount_paid) != amount_paid {
            return Err(LoanbookError::validation(
                "amount_paid",
                "Payment amount carries more than 2 fraction digits",
            ));
        }

        let mut loan = uow.loan(loan_id)?;
        if !loan.status.accepts_repayment() {
            return Err(invalid(&loan, "repayment"));
        }
        if payment_date < loan.issue_date {
            return Err(LoanbookError::validation(
                "payment_date",
                format!(
                    "Payment date {payment_date} precedes disbursement on {}",
                    loan.issue_date
                ),
            ));
        }
        if !reference.is_empty() && uow.payment_reference_used(loan.id, reference)? {
            return Err(LoanbookError::Conflict(format!(
                "Payment reference '{reference}' already recorded for loan {}",
                loan.loan_number
            )));
        }

        let outstanding = self.outstanding(uow, &loan)?;
        let allocation = allocate(&outstanding, amount_paid)?;
        debug!(
            loan = %loan.loan_number,
            penalty = %allocation.penalty,
            interest = %allocation.interest,
            principal = %allocation.principal,
            overpayment = %allocation.overpayment,
            "Repayment allocated"
        );

        let repayment_id = Uuid::new_v4();
        let seq = uow.next_sequence(Sequence::Payment)?;
        let payment_code = self.codes.format(&self.codes.payment_prefix, seq);
        let channel = self.chart.account_for(method.account_type());
        let mut transaction_ids = Vec::new();

        let loan_part = allocation.interest + allocation.principal;
        if loan_part > Decimal::ZERO {
            let mut entries = vec![EntryRequest::credit(channel, loan_part)];
            if allocation.principal > Decimal::ZERO {
                entries.push(EntryRequest::debit(self.chart.loan_fund, allocation.principal));
            }
            if allocation.interest > Decimal::ZERO {
                entries.push(EntryRequest::debit(
                    self.chart.interest_income,
                    allocation.interest,
                ));
            }
            let txn = self.ledger.post(
                uow,
                PostingRequest {
                    transaction_type: TransactionType::LoanRepayment,
                    entries,
                    loan_id: Some(loan.id),
                    repayment_id: Some(repayment_id),
                    description: format!("Repayment {payment_code} on loan {}", loan.loan_number),
                },
                at,
            )?;
            transaction_ids.push(txn.id);
        }

        if allocation.penalty > Decimal::ZERO {
            let txn = self.ledger.post(
                uow,
                PostingRequest {
                    transaction_type: TransactionType::PenaltyCollection,
                    entries: vec![
                        EntryRequest::debit(self.chart.penalty_income, allocation.penalty),
                        EntryRequest::credit(channel, allocation.penalty),
                    ],
                    loan_id: Some(loan.id),
                    repayment_id: Some(repayment_id),
                    description: format!(
                        "Penalty collected by {payment_code} on loan {}",
                        loan.loan_number
                    ),
                },
                at,
            )?;
            transaction_ids.push(txn.id);
        }

        let repayment = Repayment {
            id: repayment_id,
            payment_code,
            loan_id: loan.id,
            payment_date,
            amount_paid,
            allocation_penalty: allocation.penalty,
            allocation_interest: allocation.interest,
            allocation_principal: allocation.principal,
            overpayment: allocation.overpayment,
            method,
            reference: reference.to_string(),
            transaction_ids,
            recorded_at: at,
        };
        uow.add_repayment(repayment.clone());

        if remaining_after(&outstanding, &allocation).is_settled() {
            self.transition(uow, &mut loan, LoanStatus::Paid, SYSTEM_ACTOR, at, None)?;
            loan.closed_at = Some(at);
        }
        loan.updated_at = at;
        uow.put_loan(loan)?;
        Ok(repayment)
    }

    /// Move an active loan past its grace window to `overdue` and accrue one
    /// penalty. Repeated calls are no-ops.
    pub fn evaluate_overdue(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan_id: Uuid,
        product: &LoanProduct,
        as_of: NaiveDate,
        at: DateTime<Utc>,
    ) -> LoanbookResult<OverdueEvaluation> {
        let mut loan = uow.loan(loan_id)?;
        let days = days_overdue(loan.due_date, as_of);
        let unchanged = |loan: &Loan| OverdueEvaluation {
            loan_id: loan.id,
            status: loan.status,
            transitioned: false,
            days_overdue: days,
            penalty: None,
        };

        if loan.status != LoanStatus::Active || days <= loan.grace_days as i64 {
            return Ok(unchanged(&loan));
        }
        let outstanding = self.outstanding(uow, &loan)?;
        if outstanding.is_settled() {
            return Ok(unchanged(&loan));
        }

        self.transition(
            uow,
            &mut loan,
            LoanStatus::Overdue,
            SYSTEM_ACTOR,
            at,
            Some(format!("{days} day(s) past due on {as_of}")),
        )?;

        let amount = compute_penalty(product, outstanding.principal.max(Decimal::ZERO), days)?;
        let penalty = if amount > Decimal::ZERO {
            let penalty = uow.put_penalty(Penalty {
                id: Uuid::new_v4(),
                loan_id: loan.id,
                amount,
                days_overdue: days,
                assessed_on: as_of,
                is_waived: false,
                waived_by: None,
                waived_at: None,
                waiver_reason: None,
                version: 0,
            })?;
            info!(loan = %loan.loan_number, %amount, "Penalty accrued");
            Some(penalty)
        } else {
            None
        };

        let loan = uow.put_loan(loan)?;
        Ok(OverdueEvaluation {
            loan_id: loan.id,
            status: loan.status,
            transitioned: true,
            days_overdue: days,
            penalty,
        })
    }

    /// Exclude a penalty from future outstanding. Past postings stay as-is.
    pub fn waive_penalty(
        &self,
        uow: &mut UnitOfWork<'_>,
        penalty_id: Uuid,
        waived_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Penalty> {
        if reason.trim().is_empty() {
            return Err(LoanbookError::validation(
                "reason",
                "A waiver reason is required",
            ));
        }
        let mut penalty = uow.penalty(penalty_id)?;
        if penalty.is_waived {
            return Err(LoanbookError::validation(
                "penalty",
                format!("Penalty {penalty_id} is already waived"),
            ));
        }
        let mut loan = uow.loan(penalty.loan_id)?;
        if !loan.status.accepts_repayment() {
            return Err(invalid(&loan, "penalty waiver"));
        }

        penalty.is_waived = true;
        penalty.waived_by = Some(waived_by.to_string());
        penalty.waived_at = Some(at);
        penalty.waiver_reason = Some(reason.to_string());
        let penalty = uow.put_penalty(penalty)?;

        // Touch the loan so a racing repayment sees a stale read.
        loan.updated_at = at;
        uow.put_loan(loan)?;
        info!(penalty = %penalty_id, amount = %penalty.amount, waived_by, "Penalty waived");
        Ok(penalty)
    }

    /// Close a loan administratively, expensing any unrecovered principal.
    pub fn write_off(
        &self,
        uow: &mut UnitOfWork<'_>,
        loan_id: Uuid,
        approver: &str,
        at: DateTime<Utc>,
    ) -> LoanbookResult<Loan> {
        let mut loan = uow.loan(loan_id)?;
        if !loan.status.can_transition_to(LoanStatus::WrittenOff) {
            return Err(invalid(&loan, LoanStatus::WrittenOff));
        }

        let outstanding = self.outstanding(uow, &loan)?;
        if outstanding.principal > Decimal::ZERO {
            self.ledger.post(
                uow,
                PostingRequest {
                    transaction_type: TransactionType::LoanWriteOff,
                    entries: vec![
                        EntryRequest::debit(self.chart.loan_fund, outstanding.principal),
                        EntryRequest::credit(self.chart.operating_expense, outstanding.principal),
                    ],
                    loan_id: Some(loan.id),
                    repayment_id: None,
                    description: format!("Write-off of loan {}", loan.loan_number),
                },
                at,
            )?;
        }

        self.transition(uow, &mut loan, LoanStatus::WrittenOff, approver, at, None)?;
        loan.written_off_by = Some(approver.to_string());
        loan.written_off_at = Some(at);
        loan.closed_at = Some(at);
        uow.put_loan(loan)
    }
}
