//! Append-only coin ledger.
//!
//! A user's balance is never stored; it is `initial_balance` plus the sum of
//! every transaction recorded for the user. Debits are checked against that
//! sum inside the same store transaction that appends them, so no sequence
//! of operations can take a balance below zero.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{CoreError, RewardError, ValidationError};
use crate::storage::{RecordKind, Records, Store};

/// Why a balance changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Coins credited for an approved completion (positive amount)
    Earn,
    /// Coins debited for a purchase (negative amount)
    Spend,
    /// Correcting credit (positive amount)
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earn => "earn",
            TransactionKind::Spend => "spend",
            TransactionKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "earn" => Some(TransactionKind::Earn),
            "spend" => Some(TransactionKind::Spend),
            "refund" => Some(TransactionKind::Refund),
            _ => None,
        }
    }

    fn accepts(&self, amount: i64) -> bool {
        match self {
            TransactionKind::Spend => amount < 0,
            TransactionKind::Earn | TransactionKind::Refund => amount > 0,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    /// Signed change: positive credits, negative debits
    pub amount: i64,
    pub kind: TransactionKind,
    /// Completion or owned coupon that caused this entry
    pub reference_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Totals shown on a wallet screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletSummary {
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub transaction_count: usize,
}

/// Balance fold and validated append.
pub struct Ledger<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    initial_balance: i64,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            initial_balance: self.initial_balance,
        }
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, initial_balance: u32) -> Self {
        Self {
            store,
            clock,
            initial_balance: i64::from(initial_balance),
        }
    }

    pub fn initial_balance(&self) -> i64 {
        self.initial_balance
    }

    /// Current balance for `user_id`.
    pub fn balance(&self, user_id: &str) -> Result<i64, CoreError> {
        self.store.read(|records| self.balance_in(records, user_id))
    }

    /// Append a transaction, rejecting debits larger than the balance.
    ///
    /// # Errors
    /// `InsufficientFunds` for an uncovered `Spend`; a validation error if
    /// the amount's sign does not match `kind`.
    pub fn record(
        &self,
        user_id: &str,
        amount: i64,
        kind: TransactionKind,
        reference_id: &str,
        description: &str,
    ) -> Result<Transaction, CoreError> {
        self.store.transaction(|records| {
            self.append(records, user_id, amount, kind, reference_id, description)
        })
    }

    /// Credit `amount` coins as a correction.
    pub fn refund(
        &self,
        user_id: &str,
        amount: u32,
        reference_id: &str,
        description: &str,
    ) -> Result<Transaction, CoreError> {
        self.record(
            user_id,
            i64::from(amount),
            TransactionKind::Refund,
            reference_id,
            description,
        )
    }

    /// Transactions for `user_id`, newest first.
    pub fn history(&self, user_id: &str) -> Result<Vec<Transaction>, CoreError> {
        let mut txs = self.store.read(|records| Ok(records.transactions_for(user_id)?))?;
        txs.reverse();
        Ok(txs)
    }

    pub fn summary(&self, user_id: &str) -> Result<WalletSummary, CoreError> {
        let txs = self.store.read(|records| Ok(records.transactions_for(user_id)?))?;
        let mut summary = WalletSummary {
            balance: fold_balance(self.initial_balance, &txs)?,
            transaction_count: txs.len(),
            ..WalletSummary::default()
        };
        for tx in &txs {
            if tx.amount > 0 {
                summary.total_earned = summary.total_earned.saturating_add(tx.amount);
            } else {
                summary.total_spent = summary.total_spent.saturating_sub(tx.amount);
            }
        }
        Ok(summary)
    }

    pub(crate) fn balance_in(&self, records: &dyn Records, user_id: &str) -> Result<i64, CoreError> {
        fold_balance(self.initial_balance, &records.transactions_for(user_id)?)
    }

    /// Validated append inside an open store transaction.
    pub(crate) fn append(
        &self,
        records: &mut dyn Records,
        user_id: &str,
        amount: i64,
        kind: TransactionKind,
        reference_id: &str,
        description: &str,
    ) -> Result<Transaction, CoreError> {
        let invalid = || ValidationError::InvalidAmount {
            amount,
            kind: kind.to_string(),
        };
        if !kind.accepts(amount) {
            return Err(invalid().into());
        }

        let available = self.balance_in(records, user_id)?;
        if kind == TransactionKind::Spend {
            let needed = amount.checked_neg().ok_or_else(invalid)?;
            if needed > available {
                tracing::debug!(user_id, needed, available, "debit refused");
                return Err(RewardError::InsufficientFunds { needed, available }.into());
            }
        }
        // The resulting balance must stay representable.
        available.checked_add(amount).ok_or_else(invalid)?;

        let tx = Transaction {
            id: records.new_id(RecordKind::Transaction),
            user_id: user_id.to_string(),
            amount,
            kind,
            reference_id: reference_id.to_string(),
            description: description.to_string(),
            created_at: self.clock.now(),
        };
        records.append_transaction(&tx)?;
        tracing::info!(
            user_id,
            amount,
            kind = %kind,
            reference_id,
            "ledger entry recorded"
        );
        Ok(tx)
    }
}

/// `initial + sum(amounts)`, failing instead of wrapping on overflow.
fn fold_balance(initial: i64, txs: &[Transaction]) -> Result<i64, CoreError> {
    txs.iter()
        .try_fold(initial, |acc, t| acc.checked_add(t.amount))
        .ok_or_else(|| {
            ValidationError::InvalidValue {
                field: "balance".into(),
                message: "ledger sum overflows".into(),
            }
            .into()
        })
}
