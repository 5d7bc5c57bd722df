//! Double-entry vault ledger.
//!
//! Convention: a debit is money leaving the named account, a credit is money
//! entering it. Every transaction is balanced, so the sum of all account
//! balances never changes.

pub mod account;
pub mod vault;

pub use account::{
    AccountType, EntryRequest, EntryType, TransactionStatus, TransactionType, VaultAccount,
    VaultChart, VaultTransaction, VaultTransactionEntry,
};
pub use vault::{AccountVerification, PostingRequest, VaultLedger};
