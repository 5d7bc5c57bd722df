use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LoanbookError;
use crate::ledger::account::{AccountType, VaultTransaction};
use crate::lending::allocator::OutstandingSummary;
use crate::lending::product::LoanProduct;
use crate::loans::model::{Loan, LoanStatusChange, PaymentMethod, Penalty, Repayment};
use crate::loans::state_machine::OverdueEvaluation;
use crate::service::{Clock, FixedClock, LoanAccountingService};
use crate::store::{Borrower, InMemoryReferenceData, Store};
use crate::types::*;
use crate::LoanbookResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A scripted portfolio history replayed against a fresh in-memory engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInput {
    #[serde(default)]
    pub config: EngineConfig,
    /// Business date the clock starts on
    pub start_date: NaiveDate,
    pub products: Vec<LoanProduct>,
    pub borrowers: Vec<Borrower>,
    pub events: Vec<ScenarioEvent>,
}

fn default_actor() -> String {
    "scenario".into()
}

fn default_channel() -> PaymentMethod {
    PaymentMethod::Cash
}

/// One step of a scenario. Loans are referred to by the alias given at
/// `create_loan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Move the clock to a business date
    SetDate { date: NaiveDate },
    Fund {
        #[serde(default = "default_channel")]
        channel: PaymentMethod,
        amount: Money,
        #[serde(default)]
        reference: String,
    },
    CreateLoan {
        alias: String,
        borrower_id: Uuid,
        product_id: Uuid,
        principal: Money,
        #[serde(default)]
        term_days: Option<u32>,
        #[serde(default = "default_actor")]
        created_by: String,
    },
    Approve {
        loan: String,
        #[serde(default = "default_actor")]
        approver: String,
    },
    Reject {
        loan: String,
        #[serde(default = "default_actor")]
        actor: String,
        reason: String,
    },
    Disburse {
        loan: String,
        #[serde(default = "default_channel")]
        method: PaymentMethod,
        #[serde(default)]
        reference: String,
    },
    Repay {
        loan: String,
        amount: Money,
        #[serde(default = "default_channel")]
        method: PaymentMethod,
        #[serde(default)]
        reference: String,
        /// Defaults to the current clock date
        #[serde(default)]
        payment_date: Option<NaiveDate>,
    },
    /// Evaluate one loan, or every active loan when `loan` is omitted
    EvaluateOverdue {
        #[serde(default)]
        loan: Option<String>,
    },
    /// Waive the most recent unwaived penalty of a loan
    WaivePenalty {
        loan: String,
        #[serde(default = "default_actor")]
        waived_by: String,
        reason: String,
    },
    WriteOff {
        loan: String,
        #[serde(default = "default_actor")]
        approver: String,
    },
    Expense {
        #[serde(default = "default_channel")]
        channel: PaymentMethod,
        amount: Money,
        description: String,
    },
    Transfer {
        from: PaymentMethod,
        to: PaymentMethod,
        amount: Money,
        #[serde(default)]
        description: String,
    },
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanReport {
    pub alias: String,
    pub loan: Loan,
    pub outstanding: OutstandingSummary,
    pub repayments: Vec<Repayment>,
    pub penalties: Vec<Penalty>,
    pub history: Vec<LoanStatusChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountReport {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Money,
    pub entry_count: usize,
    pub consistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub events_applied: usize,
    pub final_date: NaiveDate,
    pub loans: Vec<LoanReport>,
    pub accounts: Vec<AccountReport>,
    pub journal: Vec<VaultTransaction>,
    pub overdue_transitions: Vec<OverdueEvaluation>,
    /// Sum of every account balance; zero for a balanced vault
    pub vault_total: Money,
    pub ledger_consistent: bool,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Replay<'a> {
    service: &'a LoanAccountingService,
    clock: &'a FixedClock,
    aliases: HashMap<String, Uuid>,
    alias_order: Vec<String>,
    overdue: Vec<OverdueEvaluation>,
    warnings: Vec<String>,
}

impl Replay<'_> {
    fn loan_id(&self, alias: &str) -> LoanbookResult<Uuid> {
        self.aliases
            .get(alias)
            .copied()
            .ok_or_else(|| LoanbookError::not_found("Scenario loan alias", alias))
    }

    fn channel(&self, method: PaymentMethod) -> Uuid {
        self.service.chart().account_for(method.account_type())
    }

    fn apply(&mut self, event: &ScenarioEvent) -> LoanbookResult<()> {
        let service = self.service;
        match event {
            ScenarioEvent::SetDate { date } => {
                if *date < self.clock.today() {
                    return Err(LoanbookError::validation(
                        "date",
                        format!("Clock cannot move back from {} to {date}", self.clock.today()),
                    ));
                }
                self.clock.set_date(*date);
            }
            ScenarioEvent::Fund {
                channel,
                amount,
                reference,
            } => {
                service.fund_account(self.channel(*channel), *amount, reference)?;
            }
            ScenarioEvent::CreateLoan {
                alias,
                borrower_id,
                product_id,
                principal,
                term_days,
                created_by,
            } => {
                if self.aliases.contains_key(alias) {
                    return Err(LoanbookError::Conflict(format!(
                        "Loan alias '{alias}' is already in use"
                    )));
                }
                let loan =
                    service.create_loan(*borrower_id, *product_id, *principal, *term_days, created_by)?;
                self.aliases.insert(alias.clone(), loan.id);
                self.alias_order.push(alias.clone());
            }
            ScenarioEvent::Approve { loan, approver } => {
                service.approve_loan(self.loan_id(loan)?, approver)?;
            }
            ScenarioEvent::Reject {
                loan,
                actor,
                reason,
            } => {
                service.reject_loan(self.loan_id(loan)?, actor, reason)?;
            }
            ScenarioEvent::Disburse {
                loan,
                method,
                reference,
            } => {
                service.disburse_loan(self.loan_id(loan)?, *method, reference)?;
            }
            ScenarioEvent::Repay {
                loan,
                amount,
                method,
                reference,
                payment_date,
            } => {
                let date = payment_date.unwrap_or_else(|| self.clock.today());
                let repayment =
                    service.record_repayment(self.loan_id(loan)?, *amount, date, *method, reference)?;
                if repayment.overpayment > Decimal::ZERO {
                    self.warnings.push(format!(
                        "{} on loan '{loan}' overpaid by {}",
                        repayment.payment_code, repayment.overpayment
                    ));
                }
            }
            ScenarioEvent::EvaluateOverdue { loan } => {
                let today = self.clock.today();
                match loan {
                    Some(alias) => {
                        let evaluation = service.evaluate_overdue(self.loan_id(alias)?, today)?;
                        if evaluation.transitioned {
                            self.overdue.push(evaluation);
                        }
                    }
                    None => self.overdue.extend(service.evaluate_all_overdue(today)?),
                }
            }
            ScenarioEvent::WaivePenalty {
                loan,
                waived_by,
                reason,
            } => {
                let loan_id = self.loan_id(loan)?;
                let penalty = service
                    .loan_penalties(loan_id)?
                    .into_iter()
                    .rev()
                    .find(|p| !p.is_waived)
                    .ok_or_else(|| {
                        LoanbookError::validation(
                            "loan",
                            format!("Loan '{loan}' has no unwaived penalty"),
                        )
                    })?;
                service.waive_penalty(penalty.id, waived_by, reason)?;
            }
            ScenarioEvent::WriteOff { loan, approver } => {
                service.write_off_loan(self.loan_id(loan)?, approver)?;
            }
            ScenarioEvent::Expense {
                channel,
                amount,
                description,
            } => {
                service.record_expense(self.channel(*channel), *amount, description)?;
            }
            ScenarioEvent::Transfer {
                from,
                to,
                amount,
                description,
            } => {
                service.transfer(self.channel(*from), self.channel(*to), *amount, description)?;
            }
        }
        Ok(())
    }
}

/// Replay a scenario and report the resulting book.
///
/// Products and borrowers are registered first, then the default chart is
/// opened and every event is applied in order. The first failing event
/// aborts the run with its error.
pub fn run_scenario(input: &ScenarioInput) -> LoanbookResult<ComputationOutput<ScenarioOutput>> {
    let start = Instant::now();

    if input.events.is_empty() {
        return Err(LoanbookError::validation(
            "events",
            "A scenario needs at least one event",
        ));
    }

    let reference = InMemoryReferenceData::new(input.config.max_interest_rate);
    for product in &input.products {
        reference.register_product(product.clone())?;
    }
    for borrower in &input.borrowers {
        reference.register_borrower(borrower.clone())?;
    }

    let clock = Arc::new(FixedClock::on(input.start_date));
    let service = LoanAccountingService::bootstrap(
        Arc::new(Store::new()),
        Arc::new(reference),
        input.config.clone(),
        clock.clone(),
    )?;

    let mut replay = Replay {
        service: &service,
        clock: &clock,
        aliases: HashMap::new(),
        alias_order: Vec::new(),
        overdue: Vec::new(),
        warnings: Vec::new(),
    };
    for (index, event) in input.events.iter().enumerate() {
        replay.apply(event).inspect_err(|e| {
            error!(index, ?event, error = %e, "Scenario event failed");
        })?;
    }

    let mut loans = Vec::with_capacity(replay.alias_order.len());
    for alias in &replay.alias_order {
        let id = replay.loan_id(alias)?;
        loans.push(LoanReport {
            alias: alias.clone(),
            loan: service.get_loan(id)?,
            outstanding: service.get_outstanding(id)?,
            repayments: service.loan_repayments(id)?,
            penalties: service.loan_penalties(id)?,
            history: service.loan_history(id)?,
        });
    }

    let mut accounts = Vec::new();
    let mut vault_total = Decimal::ZERO;
    let mut ledger_consistent = true;
    for account in service.accounts()? {
        let verification = service.verify_account(account.id)?;
        vault_total += account.current_balance;
        ledger_consistent &= verification.consistent;
        accounts.push(AccountReport {
            code: account.code,
            name: account.name,
            account_type: account.account_type,
            balance: account.current_balance,
            entry_count: verification.entry_count,
            consistent: verification.consistent,
        });
    }

    let mut warnings = replay.warnings;
    if !vault_total.is_zero() {
        ledger_consistent = false;
        warnings.push(format!("Vault balances sum to {vault_total}, expected 0"));
    }

    let output = ScenarioOutput {
        events_applied: input.events.len(),
        final_date: clock.today(),
        loans,
        accounts,
        journal: service.journal()?,
        overdue_transitions: replay.overdue,
        vault_total,
        ledger_consistent,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Double-entry vault replay with penalty-interest-principal waterfall",
        &serde_json::json!({
            "start_date": input.start_date,
            "products": input.products.len(),
            "borrowers": input.borrowers.len(),
            "events": input.events.len(),
            "rounding": "half-up to 2 dp",
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lending::product::{InterestType, PenaltyType};
    use crate::loans::state_machine::LoanStatus;
    use rust_decimal_macros::dec;

    fn input(events: Vec<ScenarioEvent>) -> ScenarioInput {
        let product = LoanProduct {
            id: Uuid::from_u128(1),
            name: "Thirty day".into(),
            interest_type: InterestType::FlatMonthly,
            interest_rate: dec!(0.10),
            max_amount: dec!(5000),
            min_amount: dec!(100),
            default_term_days: 30,
            grace_days: 5,
            penalty_type: PenaltyType::Percentage,
            penalty_value: dec!(0.05),
            is_active: true,
        };
        let borrower = Borrower {
            id: Uuid::from_u128(2),
            full_name: "Joseph M".into(),
            category: Some("retail".into()),
            credit_score: Some(610),
            is_active: true,
        };
        ScenarioInput {
            config: EngineConfig::default(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            products: vec![product],
            borrowers: vec![borrower],
            events,
        }
    }

    fn create(alias: &str, principal: Money) -> ScenarioEvent {
        ScenarioEvent::CreateLoan {
            alias: alias.into(),
            borrower_id: Uuid::from_u128(2),
            product_id: Uuid::from_u128(1),
            principal,
            term_days: None,
            created_by: "officer".into(),
        }
    }

    #[test]
    fn test_late_loan_pays_penalty_first() {
        let events = vec![
            ScenarioEvent::Fund {
                channel: PaymentMethod::Cash,
                amount: dec!(2000),
                reference: "seed".into(),
            },
            create("a", dec!(1000)),
            ScenarioEvent::Approve {
                loan: "a".into(),
                approver: "manager".into(),
            },
            ScenarioEvent::Disburse {
                loan: "a".into(),
                method: PaymentMethod::Cash,
                reference: "D1".into(),
            },
            ScenarioEvent::SetDate {
                date: NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            },
            ScenarioEvent::EvaluateOverdue { loan: None },
            ScenarioEvent::Repay {
                loan: "a".into(),
                amount: dec!(1150),
                method: PaymentMethod::Cash,
                reference: "R1".into(),
                payment_date: None,
            },
        ];
        let out = run_scenario(&input(events)).unwrap().result;

        assert_eq!(out.overdue_transitions.len(), 1);
        let report = &out.loans[0];
        assert_eq!(report.penalties[0].amount, dec!(50.00));
        assert_eq!(report.repayments[0].allocation_penalty, dec!(50.00));
        assert_eq!(report.repayments[0].allocation_interest, dec!(100.00));
        assert_eq!(report.repayments[0].allocation_principal, dec!(1000));
        assert_eq!(report.loan.status, LoanStatus::Paid);
        assert_eq!(out.vault_total, Decimal::ZERO);
        assert!(out.ledger_consistent);

        let cash = out.accounts.iter().find(|a| a.code == "CASH").unwrap();
        assert_eq!(cash.balance, dec!(2150.00));
    }

    #[test]
    fn test_unknown_alias_aborts() {
        let events = vec![ScenarioEvent::Approve {
            loan: "ghost".into(),
            approver: "manager".into(),
        }];
        let err = run_scenario(&input(events)).unwrap_err();
        assert!(matches!(err, LoanbookError::NotFound { .. }));
    }

    #[test]
    fn test_events_parse_from_json() {
        let json = r#"[
            {"event": "fund", "amount": "500"},
            {"event": "set_date", "date": "2024-03-05"},
            {"event": "evaluate_overdue"}
        ]"#;
        let events: Vec<ScenarioEvent> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            events[0],
            ScenarioEvent::Fund {
                channel: PaymentMethod::Cash,
                ..
            }
        ));
        assert!(matches!(events[2], ScenarioEvent::EvaluateOverdue { loan: None }));
    }
}
