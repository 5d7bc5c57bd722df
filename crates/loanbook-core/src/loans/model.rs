use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::account::AccountType;
use crate::lending::product::InterestType;
use crate::loans::state_machine::LoanStatus;
use crate::types::*;

/// Channel money moves through on disbursement or repayment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Bank,
    MobileMoney,
}

impl PaymentMethod {
    pub fn account_type(&self) -> AccountType {
        match self {
            PaymentMethod::Cash => AccountType::Cash,
            PaymentMethod::Bank => AccountType::Bank,
            PaymentMethod::MobileMoney => AccountType::MobileMoney,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disbursement {
    pub method: PaymentMethod,
    pub reference: String,
    pub disbursed_at: DateTime<Utc>,
    pub transaction_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub loan_number: String,
    pub borrower_id: Uuid,
    pub product_id: Uuid,
    pub principal_amount: Money,
    /// Snapshot of the product rate at creation
    pub interest_rate: Rate,
    pub interest_type: InterestType,
    pub interest_amount: Money,
    pub total_due_amount: Money,
    pub term_days: u32,
    pub grace_days: u32,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement: Option<Disbursement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_off_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_off_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Loan {
    pub fn disbursed_at(&self) -> Option<DateTime<Utc>> {
        self.disbursement.as_ref().map(|d| d.disbursed_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repayment {
    pub id: Uuid,
    pub payment_code: String,
    pub loan_id: Uuid,
    pub payment_date: NaiveDate,
    pub amount_paid: Money,
    pub allocation_penalty: Money,
    pub allocation_interest: Money,
    pub allocation_principal: Money,
    /// Excess over total outstanding; never posted to the vault
    pub overpayment: Money,
    pub method: PaymentMethod,
    pub reference: String,
    pub transaction_ids: Vec<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl Repayment {
    pub fn allocated(&self) -> Money {
        self.allocation_penalty + self.allocation_interest + self.allocation_principal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Penalty {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Money,
    pub days_overdue: i64,
    pub assessed_on: NaiveDate,
    pub is_waived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waived_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiver_reason: Option<String>,
    pub version: u64,
}

/// Audit row appended on every status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanStatusChange {
    pub loan_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<LoanStatus>,
    pub to: LoanStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
