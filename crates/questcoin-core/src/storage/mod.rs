//! Storage collaborator: the narrow interface the core persists through.
//!
//! The core never holds records between calls. Each operation opens a
//! [`Store::transaction`], reads what it needs through [`Records`], validates,
//! and writes; the store guarantees the whole closure is applied atomically
//! and serialized against other balance-affecting writes.

mod config;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use config::{Config, CouponsConfig, IdentityConfig, LedgerConfig, LoggingConfig};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use crate::completion::Completion;
use crate::error::{ConfigError, CoreError, StorageError};
use crate::exchange::{OwnedCoupon, RedemptionRequest};
use crate::ledger::Transaction;
use crate::status::ReviewStatus;

/// Returns the data directory, creating it if needed.
///
/// Resolution order: `QUESTCOIN_DATA_DIR`, then `~/.config/questcoin-dev`
/// when `QUESTCOIN_ENV=dev`, then `~/.config/questcoin`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("QUESTCOIN_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("QUESTCOIN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("questcoin-dev")
            } else {
                base_dir.join("questcoin")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Kind of record a fresh identifier is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Transaction,
    Completion,
    OwnedCoupon,
    RedemptionRequest,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordKind::Transaction => "txn",
            RecordKind::Completion => "cmp",
            RecordKind::OwnedCoupon => "own",
            RecordKind::RedemptionRequest => "rdm",
        }
    }
}

/// Per-entity record access inside a store transaction.
///
/// All list methods return records in insertion order. The completion
/// engine relies on this to break submission-timestamp ties.
pub trait Records {
    /// Mint a globally unique identifier.
    fn new_id(&mut self, kind: RecordKind) -> String {
        format!("{}-{}", kind.prefix(), uuid::Uuid::new_v4())
    }

    // Transactions (append-only)
    fn append_transaction(&mut self, tx: &Transaction) -> Result<(), StorageError>;
    fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>, StorageError>;

    // Completions
    fn insert_completion(&mut self, completion: &Completion) -> Result<(), StorageError>;
    fn update_completion(&mut self, completion: &Completion) -> Result<(), StorageError>;
    fn completion(&self, id: &str) -> Result<Option<Completion>, StorageError>;
    fn completions_for_user(&self, user_id: &str) -> Result<Vec<Completion>, StorageError>;
    fn completions_with_status(&self, status: ReviewStatus) -> Result<Vec<Completion>, StorageError>;

    fn completions_for_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<Vec<Completion>, StorageError> {
        Ok(self
            .completions_for_user(user_id)?
            .into_iter()
            .filter(|c| c.task_id == task_id)
            .collect())
    }

    // Owned coupons
    fn insert_owned_coupon(&mut self, coupon: &OwnedCoupon) -> Result<(), StorageError>;
    fn update_owned_coupon(&mut self, coupon: &OwnedCoupon) -> Result<(), StorageError>;
    fn owned_coupon(&self, id: &str) -> Result<Option<OwnedCoupon>, StorageError>;
    fn owned_coupon_by_code(&self, code: &str) -> Result<Option<OwnedCoupon>, StorageError>;
    fn owned_coupons_for(&self, owner_id: &str) -> Result<Vec<OwnedCoupon>, StorageError>;

    // Redemption requests
    fn insert_redemption(&mut self, request: &RedemptionRequest) -> Result<(), StorageError>;
    fn update_redemption(&mut self, request: &RedemptionRequest) -> Result<(), StorageError>;
    fn redemption(&self, id: &str) -> Result<Option<RedemptionRequest>, StorageError>;
    fn redemptions_for_coupon(
        &self,
        owned_coupon_id: &str,
    ) -> Result<Vec<RedemptionRequest>, StorageError>;
    fn redemptions_with_status(
        &self,
        status: ReviewStatus,
    ) -> Result<Vec<RedemptionRequest>, StorageError>;
}

/// A durable record store supporting atomic read-modify-write.
pub trait Store: Send + Sync {
    /// Run `f` as one atomic unit.
    ///
    /// If `f` returns an error nothing it wrote is kept. No other
    /// transaction on the same store interleaves with it.
    fn transaction<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut dyn Records) -> Result<T, CoreError>;

    /// Read-only access.
    fn read<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&dyn Records) -> Result<T, CoreError>,
    {
        self.transaction(|records| f(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ids_carry_kind_prefix_and_are_unique() {
        let mut state = memory::MemoryState::default();
        let a = state.new_id(RecordKind::Completion);
        let b = state.new_id(RecordKind::Completion);
        assert!(a.starts_with("cmp-"));
        assert_ne!(a, b);
        assert!(state.new_id(RecordKind::RedemptionRequest).starts_with("rdm-"));
    }
}
