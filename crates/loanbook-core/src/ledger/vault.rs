use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::CodeFormat;
use crate::error::LoanbookError;
use crate::ledger::account::{
    EntryRequest, EntryType, TransactionStatus, TransactionType, VaultAccount, VaultTransaction,
    VaultTransactionEntry,
};
use crate::store::{Sequence, UnitOfWork};
use crate::types::*;
use crate::LoanbookResult;

/// A balanced set of entries to post as one vault transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingRequest {
    pub transaction_type: TransactionType,
    pub entries: Vec<EntryRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repayment_id: Option<Uuid>,
    pub description: String,
}

/// Result of replaying an account's entry history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountVerification {
    pub account_id: Uuid,
    pub code: String,
    pub entry_count: usize,
    pub replayed_balance: Money,
    pub current_balance: Money,
    pub consistent: bool,
    /// Sequence of the first entry whose `balance_after` breaks the chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_break: Option<u64>,
}

/// Posts balanced double-entry transactions inside a unit of work.
///
/// Balance updates are part of the posting itself: the entries, the new
/// `current_balance` of each touched account and the transaction row are
/// staged together and commit together.
pub struct VaultLedger {
    codes: CodeFormat,
}

impl VaultLedger {
    pub fn new(codes: CodeFormat) -> Self {
        Self { codes }
    }

    pub fn post(
        &self,
        uow: &mut UnitOfWork<'_>,
        request: PostingRequest,
        at: DateTime<Utc>,
    ) -> LoanbookResult<VaultTransaction> {
        let total = validate_entries(&request.entries).inspect_err(|e| {
            error!(
                transaction_type = ?request.transaction_type,
                error = %e,
                "Rejected unbalanced vault posting"
            );
        })?;

        let mut working: HashMap<Uuid, VaultAccount> = HashMap::new();
        for entry in &request.entries {
            if !working.contains_key(&entry.account_id) {
                let account = uow.account(entry.account_id)?;
                working.insert(entry.account_id, account);
            }
        }

        let transaction_id = Uuid::new_v4();
        let mut entries = Vec::with_capacity(request.entries.len());
        for entry in &request.entries {
            let account = working
                .get_mut(&entry.account_id)
                .ok_or_else(|| LoanbookError::not_found("Vault account", entry.account_id))?;
            let balance_after = account.current_balance + entry.entry_type.signed(entry.amount);
            if balance_after < Decimal::ZERO && !account.account_type.allows_negative() {
                let violation = LoanbookError::ConstraintViolation(format!(
                    "{:?} of {} would leave account {} ({}) at {}",
                    entry.entry_type, entry.amount, account.code, account.account_type, balance_after
                ));
                error!(account = %account.code, %balance_after, "Rejected posting: negative balance");
                return Err(violation);
            }
            account.current_balance = balance_after;
            entries.push(VaultTransactionEntry {
                id: Uuid::new_v4(),
                transaction_id,
                account_id: entry.account_id,
                entry_type: entry.entry_type,
                amount: entry.amount,
                balance_after,
                sequence: 0,
            });
        }

        let seq = uow.next_sequence(Sequence::Transaction)?;
        let transaction_code = self.codes.format(&self.codes.transaction_prefix, seq);
        for entry in entries.iter_mut() {
            entry.sequence = uow.next_sequence(Sequence::Entry)?;
        }
        for account in working.into_values() {
            uow.put_account(account)?;
        }

        let transaction = VaultTransaction {
            id: transaction_id,
            transaction_code,
            transaction_type: request.transaction_type,
            total_amount: total,
            status: TransactionStatus::Completed,
            description: request.description,
            loan_id: request.loan_id,
            repayment_id: request.repayment_id,
            created_at: at,
        };
        info!(
            code = %transaction.transaction_code,
            transaction_type = ?transaction.transaction_type,
            total = %total,
            entries = entries.len(),
            "Vault transaction staged"
        );
        uow.add_transaction(transaction.clone(), entries);
        Ok(transaction)
    }
}

/// Check a posting request and return its total (sum of debits).
pub fn validate_entries(entries: &[EntryRequest]) -> LoanbookResult<Money> {
    if entries.is_empty() {
        return Err(LoanbookError::ConstraintViolation(
            "A vault transaction needs at least one entry".into(),
        ));
    }

    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;
    for (i, entry) in entries.iter().enumerate() {
        if entry.amount <= Decimal::ZERO {
            return Err(LoanbookError::ConstraintViolation(format!(
                "Entry {i} has non-positive amount {}",
                entry.amount
            )));
        }
        if round_money(entry.amount) != entry.amount {
            return Err(LoanbookError::ConstraintViolation(format!(
                "Entry {i} amount {} carries more than 2 fraction digits",
                entry.amount
            )));
        }
        match entry.entry_type {
            EntryType::Debit => debits += entry.amount,
            EntryType::Credit => credits += entry.amount,
        }
    }

    if debits != credits {
        return Err(LoanbookError::ConstraintViolation(format!(
            "Unbalanced entries: debits {debits} != credits {credits}"
        )));
    }
    Ok(debits)
}

/// Check a committed transaction against its entries.
pub fn verify_transaction(
    transaction: &VaultTransaction,
    entries: &[VaultTransactionEntry],
) -> LoanbookResult<()> {
    let requests: Vec<EntryRequest> = entries
        .iter()
        .map(|e| EntryRequest {
            account_id: e.account_id,
            entry_type: e.entry_type,
            amount: e.amount,
        })
        .collect();
    let total = validate_entries(&requests)?;
    if total != transaction.total_amount {
        return Err(LoanbookError::ConstraintViolation(format!(
            "Transaction {} total {} does not match entries {}",
            transaction.transaction_code, transaction.total_amount, total
        )));
    }
    Ok(())
}

/// Replay an account's entries in creation order and compare with its
/// stored balance and every recorded `balance_after`.
pub fn verify_account(
    account: &VaultAccount,
    entries: &[VaultTransactionEntry],
) -> AccountVerification {
    let mut ordered: Vec<&VaultTransactionEntry> = entries
        .iter()
        .filter(|e| e.account_id == account.id)
        .collect();
    ordered.sort_by_key(|e| e.sequence);

    let mut running = Decimal::ZERO;
    let mut first_break = None;
    for entry in &ordered {
        running += entry.entry_type.signed(entry.amount);
        if first_break.is_none() && running != entry.balance_after {
            first_break = Some(entry.sequence);
        }
    }

    AccountVerification {
        account_id: account.id,
        code: account.code.clone(),
        entry_count: ordered.len(),
        replayed_balance: running,
        current_balance: account.current_balance,
        consistent: first_break.is_none() && running == account.current_balance,
        first_break,
    }
}
