//! In-memory transactional store.
//!
//! All reads and writes go through a [`UnitOfWork`]. A unit of work stages
//! its writes privately and remembers the version of every row it read.
//! `commit` takes the write lock once, checks every remembered version
//! against the committed state, checks uniqueness of generated codes, and
//! only then applies the whole batch. A stale read fails the commit with
//! [`LoanbookError::VersionConflict`] and nothing is applied; dropping a
//! unit of work without committing discards it.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use uuid::Uuid;

use crate::error::LoanbookError;
use crate::ledger::account::{VaultAccount, VaultTransaction, VaultTransactionEntry};
use crate::loans::model::{Loan, LoanStatusChange, Penalty, Repayment};
use crate::LoanbookResult;

/// Monotonic counters backing human-readable codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Loan,
    Payment,
    Transaction,
    Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Loan(Uuid),
    Penalty(Uuid),
    Account(Uuid),
    Sequence(Sequence),
}

impl RowKey {
    fn describe(&self) -> (&'static str, String) {
        match self {
            RowKey::Loan(id) => ("loan", id.to_string()),
            RowKey::Penalty(id) => ("penalty", id.to_string()),
            RowKey::Account(id) => ("vault account", id.to_string()),
            RowKey::Sequence(s) => ("sequence", format!("{s:?}")),
        }
    }
}

#[derive(Default)]
struct StoreState {
    loans: HashMap<Uuid, Loan>,
    loan_order: Vec<Uuid>,
    loan_numbers: HashSet<String>,
    repayments: Vec<Repayment>,
    payment_codes: HashSet<String>,
    payment_refs: HashSet<(Uuid, String)>,
    penalties: HashMap<Uuid, Penalty>,
    penalty_order: Vec<Uuid>,
    history: Vec<LoanStatusChange>,
    accounts: HashMap<Uuid, VaultAccount>,
    account_order: Vec<Uuid>,
    account_codes: HashMap<String, Uuid>,
    transactions: Vec<VaultTransaction>,
    transaction_codes: HashSet<String>,
    entries: Vec<VaultTransactionEntry>,
    sequences: HashMap<Sequence, u64>,
}

impl StoreState {
    fn version_of(&self, key: &RowKey) -> Option<u64> {
        match key {
            RowKey::Loan(id) => self.loans.get(id).map(|l| l.version),
            RowKey::Penalty(id) => self.penalties.get(id).map(|p| p.version),
            RowKey::Account(id) => self.accounts.get(id).map(|a| a.version),
            RowKey::Sequence(s) => Some(self.sequences.get(s).copied().unwrap_or(0)),
        }
    }
}

fn poisoned() -> LoanbookError {
    LoanbookError::Concurrency {
        operation: "store".into(),
        attempts: 1,
        reason: "storage lock poisoned by a panicked writer".into(),
    }
}

/// Shared storage handle. Construct one explicitly and share it via `Arc`.
#[derive(Default)]
pub struct Store {
    inner: RwLock<StoreState>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a unit of work against the current committed state.
    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(self)
    }

    fn read_state(&self) -> LoanbookResult<RwLockReadGuard<'_, StoreState>> {
        self.inner.read().map_err(|_| poisoned())
    }

    fn write_state(&self) -> LoanbookResult<RwLockWriteGuard<'_, StoreState>> {
        self.inner.write().map_err(|_| poisoned())
    }

    // -- committed-state queries ------------------------------------------

    pub fn loan(&self, id: Uuid) -> LoanbookResult<Loan> {
        self.read_state()?
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| LoanbookError::not_found("Loan", id))
    }

    pub fn loans(&self) -> LoanbookResult<Vec<Loan>> {
        let state = self.read_state()?;
        Ok(state
            .loan_order
            .iter()
            .filter_map(|id| state.loans.get(id).cloned())
            .collect())
    }

    pub fn repayments(&self) -> LoanbookResult<Vec<Repayment>> {
        Ok(self.read_state()?.repayments.clone())
    }

    pub fn repayments_for_loan(&self, loan_id: Uuid) -> LoanbookResult<Vec<Repayment>> {
        Ok(self
            .read_state()?
            .repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect())
    }

    pub fn penalty(&self, id: Uuid) -> LoanbookResult<Penalty> {
        self.read_state()?
            .penalties
            .get(&id)
            .cloned()
            .ok_or_else(|| LoanbookError::not_found("Penalty", id))
    }

    pub fn penalties_for_loan(&self, loan_id: Uuid) -> LoanbookResult<Vec<Penalty>> {
        let state = self.read_state()?;
        Ok(state
            .penalty_order
            .iter()
            .filter_map(|id| state.penalties.get(id))
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }

    pub fn history_for_loan(&self, loan_id: Uuid) -> LoanbookResult<Vec<LoanStatusChange>> {
        Ok(self
            .read_state()?
            .history
            .iter()
            .filter(|h| h.loan_id == loan_id)
            .cloned()
            .collect())
    }

    pub fn account(&self, id: Uuid) -> LoanbookResult<VaultAccount> {
        self.read_state()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LoanbookError::not_found("Vault account", id))
    }

    pub fn account_by_code(&self, code: &str) -> LoanbookResult<Option<VaultAccount>> {
        let state = self.read_state()?;
        Ok(state
            .account_codes
            .get(code)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    pub fn accounts(&self) -> LoanbookResult<Vec<VaultAccount>> {
        let state = self.read_state()?;
        Ok(state
            .account_order
            .iter()
            .filter_map(|id| state.accounts.get(id).cloned())
            .collect())
    }

    pub fn transactions(&self) -> LoanbookResult<Vec<VaultTransaction>> {
        Ok(self.read_state()?.transactions.clone())
    }

    pub fn transaction(&self, id: Uuid) -> LoanbookResult<VaultTransaction> {
        self.read_state()?
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| LoanbookError::not_found("Vault transaction", id))
    }

    /// Entries touching an account, in creation order.
    pub fn entries_for_account(&self, account_id: Uuid) -> LoanbookResult<Vec<VaultTransactionEntry>> {
        Ok(self
            .read_state()?
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    pub fn entries_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> LoanbookResult<Vec<VaultTransactionEntry>> {
        Ok(self
            .read_state()?
            .entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}

/// Staged reads and writes that commit together or not at all.
pub struct UnitOfWork<'s> {
    store: &'s Store,
    read_set: HashMap<RowKey, Option<u64>>,
    loans: HashMap<Uuid, Loan>,
    penalties: HashMap<Uuid, Penalty>,
    accounts: HashMap<Uuid, VaultAccount>,
    repayments: Vec<Repayment>,
    history: Vec<LoanStatusChange>,
    transactions: Vec<VaultTransaction>,
    entries: Vec<VaultTransactionEntry>,
    sequences: HashMap<Sequence, u64>,
}

impl<'s> UnitOfWork<'s> {
    fn new(store: &'s Store) -> Self {
        UnitOfWork {
            store,
            read_set: HashMap::new(),
            loans: HashMap::new(),
            penalties: HashMap::new(),
            accounts: HashMap::new(),
            repayments: Vec::new(),
            history: Vec::new(),
            transactions: Vec::new(),
            entries: Vec::new(),
            sequences: HashMap::new(),
        }
    }

    /// Version of a row as first seen by this unit of work.
    fn observed(&mut self, key: RowKey) -> LoanbookResult<Option<u64>> {
        if let Some(version) = self.read_set.get(&key) {
            return Ok(*version);
        }
        let version = self.store.read_state()?.version_of(&key);
        self.read_set.insert(key, version);
        Ok(version)
    }

    // -- loans --------------------------------------------------------------

    pub fn loan(&mut self, id: Uuid) -> LoanbookResult<Loan> {
        if let Some(staged) = self.loans.get(&id) {
            return Ok(staged.clone());
        }
        let loan = self.store.read_state()?.loans.get(&id).cloned();
        let loan = loan.ok_or_else(|| LoanbookError::not_found("Loan", id))?;
        self.read_set.entry(RowKey::Loan(id)).or_insert(Some(loan.version));
        Ok(loan)
    }

    /// Stage an insert or update; returns the row with its post-commit version.
    pub fn put_loan(&mut self, mut loan: Loan) -> LoanbookResult<Loan> {
        loan.version = match self.loans.get(&loan.id) {
            Some(staged) => staged.version,
            None => self.observed(RowKey::Loan(loan.id))?.map_or(1, |v| v + 1),
        };
        self.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    // -- penalties ----------------------------------------------------------

    pub fn penalty(&mut self, id: Uuid) -> LoanbookResult<Penalty> {
        if let Some(staged) = self.penalties.get(&id) {
            return Ok(staged.clone());
        }
        let penalty = self.store.read_state()?.penalties.get(&id).cloned();
        let penalty = penalty.ok_or_else(|| LoanbookError::not_found("Penalty", id))?;
        self.read_set
            .entry(RowKey::Penalty(id))
            .or_insert(Some(penalty.version));
        Ok(penalty)
    }

    /// Penalties of a loan, committed rows overlaid with staged ones.
    pub fn loan_penalties(&mut self, loan_id: Uuid) -> LoanbookResult<Vec<Penalty>> {
        let committed = self.store.penalties_for_loan(loan_id)?;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(committed.len());
        for penalty in committed {
            self.read_set
                .entry(RowKey::Penalty(penalty.id))
                .or_insert(Some(penalty.version));
            seen.insert(penalty.id);
            out.push(self.penalties.get(&penalty.id).cloned().unwrap_or(penalty));
        }
        let mut staged_new: Vec<Penalty> = self
            .penalties
            .values()
            .filter(|p| p.loan_id == loan_id && !seen.contains(&p.id))
            .cloned()
            .collect();
        staged_new.sort_by_key(|p| p.assessed_on);
        out.extend(staged_new);
        Ok(out)
    }

    pub fn put_penalty(&mut self, mut penalty: Penalty) -> LoanbookResult<Penalty> {
        penalty.version = match self.penalties.get(&penalty.id) {
            Some(staged) => staged.version,
            None => self
                .observed(RowKey::Penalty(penalty.id))?
                .map_or(1, |v| v + 1),
        };
        self.penalties.insert(penalty.id, penalty.clone());
        Ok(penalty)
    }

    // -- repayments ---------------------------------------------------------

    pub fn loan_repayments(&mut self, loan_id: Uuid) -> LoanbookResult<Vec<Repayment>> {
        let mut out = self.store.repayments_for_loan(loan_id)?;
        out.extend(self.repayments.iter().filter(|r| r.loan_id == loan_id).cloned());
        Ok(out)
    }

    pub fn payment_reference_used(&self, loan_id: Uuid, reference: &str) -> LoanbookResult<bool> {
        if self
            .repayments
            .iter()
            .any(|r| r.loan_id == loan_id && r.reference == reference)
        {
            return Ok(true);
        }
        Ok(self
            .store
            .read_state()?
            .payment_refs
            .contains(&(loan_id, reference.to_string())))
    }

    pub fn add_repayment(&mut self, repayment: Repayment) {
        self.repayments.push(repayment);
    }

    pub fn record_transition(&mut self, change: LoanStatusChange) {
        self.history.push(change);
    }

    // -- vault --------------------------------------------------------------

    pub fn account(&mut self, id: Uuid) -> LoanbookResult<VaultAccount> {
        if let Some(staged) = self.accounts.get(&id) {
            return Ok(staged.clone());
        }
        let account = self.store.read_state()?.accounts.get(&id).cloned();
        let account = account.ok_or_else(|| LoanbookError::not_found("Vault account", id))?;
        self.read_set
            .entry(RowKey::Account(id))
            .or_insert(Some(account.version));
        Ok(account)
    }

    pub fn account_code_taken(&self, code: &str) -> LoanbookResult<bool> {
        if self.accounts.values().any(|a| a.code == code) {
            return Ok(true);
        }
        Ok(self.store.read_state()?.account_codes.contains_key(code))
    }

    pub fn put_account(&mut self, mut account: VaultAccount) -> LoanbookResult<VaultAccount> {
        account.version = match self.accounts.get(&account.id) {
            Some(staged) => staged.version,
            None => self
                .observed(RowKey::Account(account.id))?
                .map_or(1, |v| v + 1),
        };
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    pub fn add_transaction(
        &mut self,
        transaction: VaultTransaction,
        entries: Vec<VaultTransactionEntry>,
    ) {
        self.transactions.push(transaction);
        self.entries.extend(entries);
    }

    /// Next value of a counter. Two units of work drawing from the same
    /// counter cannot both commit.
    pub fn next_sequence(&mut self, sequence: Sequence) -> LoanbookResult<u64> {
        let current = match self.sequences.get(&sequence) {
            Some(v) => *v,
            None => self
                .observed(RowKey::Sequence(sequence))?
                .unwrap_or(0),
        };
        let next = current + 1;
        self.sequences.insert(sequence, next);
        Ok(next)
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
            && self.penalties.is_empty()
            && self.accounts.is_empty()
            && self.repayments.is_empty()
            && self.history.is_empty()
            && self.transactions.is_empty()
    }

    // -- commit -------------------------------------------------------------

    /// Apply every staged write atomically.
    pub fn commit(self) -> LoanbookResult<()> {
        let mut state = self.store.write_state()?;

        for (key, expected) in &self.read_set {
            let found = state.version_of(key);
            if found != *expected {
                let (entity, id) = key.describe();
                return Err(LoanbookError::VersionConflict {
                    entity: entity.into(),
                    id,
                    expected: expected.unwrap_or(0),
                    found: found.unwrap_or(0),
                });
            }
        }

        let mut fresh_loan_numbers = HashSet::new();
        for loan in self.loans.values() {
            if !state.loans.contains_key(&loan.id)
                && (state.loan_numbers.contains(&loan.loan_number)
                    || !fresh_loan_numbers.insert(loan.loan_number.as_str()))
            {
                return Err(LoanbookError::Conflict(format!(
                    "Duplicate loan number {}",
                    loan.loan_number
                )));
            }
        }
        let mut fresh_payment_codes = HashSet::new();
        let mut fresh_refs = HashSet::new();
        for repayment in &self.repayments {
            if state.payment_codes.contains(&repayment.payment_code)
                || !fresh_payment_codes.insert(repayment.payment_code.as_str())
            {
                return Err(LoanbookError::Conflict(format!(
                    "Duplicate payment code {}",
                    repayment.payment_code
                )));
            }
            if !repayment.reference.is_empty() {
                let key = (repayment.loan_id, repayment.reference.clone());
                if state.payment_refs.contains(&key) || !fresh_refs.insert(key) {
                    return Err(LoanbookError::Conflict(format!(
                        "Payment reference '{}' already recorded for loan {}",
                        repayment.reference, repayment.loan_id
                    )));
                }
            }
        }
        let mut fresh_txn_codes = HashSet::new();
        for txn in &self.transactions {
            if state.transaction_codes.contains(&txn.transaction_code)
                || !fresh_txn_codes.insert(txn.transaction_code.as_str())
            {
                return Err(LoanbookError::Conflict(format!(
                    "Duplicate transaction code {}",
                    txn.transaction_code
                )));
            }
        }
        let mut fresh_account_codes = HashSet::new();
        for account in self.accounts.values() {
            if !state.accounts.contains_key(&account.id)
                && (state.account_codes.contains_key(&account.code)
                    || !fresh_account_codes.insert(account.code.as_str()))
            {
                return Err(LoanbookError::Conflict(format!(
                    "Duplicate account code {}",
                    account.code
                )));
            }
        }

        // Validation passed; nothing below can fail.
        let summary = (
            self.loans.len(),
            self.repayments.len(),
            self.transactions.len(),
            self.entries.len(),
        );

        let mut new_loans: Vec<&Loan> = self
            .loans
            .values()
            .filter(|l| !state.loans.contains_key(&l.id))
            .collect();
        new_loans.sort_by_key(|l| l.loan_number.clone());
        for loan in new_loans {
            state.loan_order.push(loan.id);
            state.loan_numbers.insert(loan.loan_number.clone());
        }
        for (id, loan) in self.loans {
            state.loans.insert(id, loan);
        }

        let mut new_penalties: Vec<&Penalty> = self
            .penalties
            .values()
            .filter(|p| !state.penalties.contains_key(&p.id))
            .collect();
        new_penalties.sort_by_key(|p| p.assessed_on);
        let new_penalty_ids: Vec<Uuid> = new_penalties.iter().map(|p| p.id).collect();
        state.penalty_order.extend(new_penalty_ids);
        for (id, penalty) in self.penalties {
            state.penalties.insert(id, penalty);
        }

        let mut new_accounts: Vec<&VaultAccount> = self
            .accounts
            .values()
            .filter(|a| !state.accounts.contains_key(&a.id))
            .collect();
        new_accounts.sort_by_key(|a| a.created_at);
        for account in new_accounts {
            state.account_order.push(account.id);
            state.account_codes.insert(account.code.clone(), account.id);
        }
        for (id, account) in self.accounts {
            state.accounts.insert(id, account);
        }

        for repayment in self.repayments {
            state.payment_codes.insert(repayment.payment_code.clone());
            if !repayment.reference.is_empty() {
                state
                    .payment_refs
                    .insert((repayment.loan_id, repayment.reference.clone()));
            }
            state.repayments.push(repayment);
        }
        state.history.extend(self.history);
        for txn in self.transactions {
            state.transaction_codes.insert(txn.transaction_code.clone());
            state.transactions.push(txn);
        }
        state.entries.extend(self.entries);
        for (sequence, value) in self.sequences {
            state.sequences.insert(sequence, value);
        }

        debug!(
            loans = summary.0,
            repayments = summary.1,
            transactions = summary.2,
            entries = summary.3,
            "Unit of work committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::AccountType;
    use chrono::Utc;

    #[test]
    fn test_uncommitted_work_is_discarded() {
        let store = Store::new();
        {
            let mut uow = store.begin();
            uow.put_account(VaultAccount::open("CASH", "Cash", AccountType::Cash, Utc::now()))
                .unwrap();
            assert!(!uow.is_empty());
        }
        assert!(store.accounts().unwrap().is_empty());
    }

    #[test]
    fn test_commit_bumps_version() {
        let store = Store::new();
        let mut uow = store.begin();
        let account = uow
            .put_account(VaultAccount::open("CASH", "Cash", AccountType::Cash, Utc::now()))
            .unwrap();
        assert_eq!(account.version, 1);
        uow.commit().unwrap();

        let mut uow = store.begin();
        let mut loaded = uow.account(account.id).unwrap();
        loaded.name = "Main cash".into();
        let updated = uow.put_account(loaded).unwrap();
        assert_eq!(updated.version, 2);
        uow.commit().unwrap();
        assert_eq!(store.account(account.id).unwrap().version, 2);
    }

    #[test]
    fn test_stale_read_fails_commit() {
        let store = Store::new();
        let mut setup = store.begin();
        let account = setup
            .put_account(VaultAccount::open("CASH", "Cash", AccountType::Cash, Utc::now()))
            .unwrap();
        setup.commit().unwrap();

        let mut first = store.begin();
        let mut second = store.begin();
        let a = first.account(account.id).unwrap();
        let b = second.account(account.id).unwrap();
        first.put_account(a).unwrap();
        second.put_account(b).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sequences_are_serialized() {
        let store = Store::new();
        let mut first = store.begin();
        let mut second = store.begin();
        assert_eq!(first.next_sequence(Sequence::Transaction).unwrap(), 1);
        assert_eq!(first.next_sequence(Sequence::Transaction).unwrap(), 2);
        assert_eq!(second.next_sequence(Sequence::Transaction).unwrap(), 1);
        first.commit().unwrap();
        assert!(second.commit().unwrap_err().is_retryable());

        let mut third = store.begin();
        assert_eq!(third.next_sequence(Sequence::Transaction).unwrap(), 3);
    }

    #[test]
    fn test_duplicate_account_code_conflicts() {
        let store = Store::new();
        let mut uow = store.begin();
        uow.put_account(VaultAccount::open("CASH", "Cash", AccountType::Cash, Utc::now()))
            .unwrap();
        uow.commit().unwrap();

        let mut uow = store.begin();
        uow.put_account(VaultAccount::open("CASH", "Other", AccountType::Cash, Utc::now()))
            .unwrap();
        assert!(matches!(uow.commit(), Err(LoanbookError::Conflict(_))));
        assert_eq!(store.accounts().unwrap().len(), 1);
    }
}
