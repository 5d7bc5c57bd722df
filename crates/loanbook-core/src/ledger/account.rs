use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::Money;

/// Kind of vault account.
///
/// Channels (cash, bank, mobile money) hold real money. `loan_fund` holds
/// principal currently out with borrowers. Income and capital accounts are
/// sources: money flows out of them into the vault, so they run negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Cash,
    Bank,
    MobileMoney,
    OperatingExpense,
    LoanFund,
    InterestIncome,
    PenaltyIncome,
    Capital,
}

impl AccountType {
    /// Source accounts may carry a negative balance.
    pub fn allows_negative(&self) -> bool {
        matches!(
            self,
            AccountType::InterestIncome | AccountType::PenaltyIncome | AccountType::Capital
        )
    }

    /// Accounts money can physically be paid into or out of.
    pub fn is_channel(&self) -> bool {
        matches!(
            self,
            AccountType::Cash | AccountType::Bank | AccountType::MobileMoney
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Cash => "cash",
            AccountType::Bank => "bank",
            AccountType::MobileMoney => "mobile_money",
            AccountType::OperatingExpense => "operating_expense",
            AccountType::LoanFund => "loan_fund",
            AccountType::InterestIncome => "interest_income",
            AccountType::PenaltyIncome => "penalty_income",
            AccountType::Capital => "capital",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debit = money leaving the named account, credit = money entering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    /// Effect of an entry of this type on the account balance.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            EntryType::Debit => -amount,
            EntryType::Credit => amount,
        }
    }
}

/// Business event a vault transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    CapitalInjection,
    LoanDisbursement,
    LoanRepayment,
    PenaltyCollection,
    LoanWriteOff,
    Expense,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultAccount {
    pub id: Uuid,
    /// Unique short code, e.g. `CASH`
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Derived from entries; only the ledger writes it
    pub current_balance: Money,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl VaultAccount {
    pub fn open(code: &str, name: &str, account_type: AccountType, at: DateTime<Utc>) -> Self {
        VaultAccount {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            current_balance: Decimal::ZERO,
            created_at: at,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultTransaction {
    pub id: Uuid,
    pub transaction_code: String,
    pub transaction_type: TransactionType,
    pub total_amount: Money,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repayment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultTransactionEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub entry_type: EntryType,
    pub amount: Money,
    /// Account balance immediately after this entry
    pub balance_after: Money,
    /// Global creation order
    pub sequence: u64,
}

/// One leg of a posting request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRequest {
    pub account_id: Uuid,
    pub entry_type: EntryType,
    pub amount: Money,
}

impl EntryRequest {
    pub fn debit(account_id: Uuid, amount: Money) -> Self {
        EntryRequest {
            account_id,
            entry_type: EntryType::Debit,
            amount,
        }
    }

    pub fn credit(account_id: Uuid, amount: Money) -> Self {
        EntryRequest {
            account_id,
            entry_type: EntryType::Credit,
            amount,
        }
    }
}

/// The designated account for each role the engine posts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultChart {
    pub cash: Uuid,
    pub bank: Uuid,
    pub mobile_money: Uuid,
    pub loan_fund: Uuid,
    pub interest_income: Uuid,
    pub penalty_income: Uuid,
    pub operating_expense: Uuid,
    pub capital: Uuid,
}

impl VaultChart {
    /// Default codes and names used when opening a fresh chart.
    pub const DEFAULTS: [(&'static str, &'static str, AccountType); 8] = [
        ("CASH", "Cash vault", AccountType::Cash),
        ("BANK", "Bank account", AccountType::Bank),
        ("MOMO", "Mobile money wallet", AccountType::MobileMoney),
        ("LOANS", "Loan fund (principal outstanding)", AccountType::LoanFund),
        ("INT-INC", "Interest income", AccountType::InterestIncome),
        ("PEN-INC", "Penalty income", AccountType::PenaltyIncome),
        ("OPEX", "Operating expense", AccountType::OperatingExpense),
        ("CAPITAL", "Owner capital", AccountType::Capital),
    ];

    pub fn account_for(&self, account_type: AccountType) -> Uuid {
        match account_type {
            AccountType::Cash => self.cash,
            AccountType::Bank => self.bank,
            AccountType::MobileMoney => self.mobile_money,
            AccountType::LoanFund => self.loan_fund,
            AccountType::InterestIncome => self.interest_income,
            AccountType::PenaltyIncome => self.penalty_income,
            AccountType::OperatingExpense => self.operating_expense,
            AccountType::Capital => self.capital,
        }
    }
}
