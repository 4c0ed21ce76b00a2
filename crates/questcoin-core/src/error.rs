//! Core error types for questcoin-core.
//!
//! Domain outcomes ([`RewardError`]) are user-facing validation results and
//! never indicate corrupted state. Store failures ([`StorageError`]) are
//! passed through unmodified so the caller can offer a retry.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for questcoin-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rule violations: eligibility, funds, lifecycle state
    #[error(transparent)]
    Reward(#[from] RewardError),

    /// Failures reported by the storage collaborator
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Whether the operation may succeed if simply tried again.
    ///
    /// Only storage failures qualify; every other variant is a
    /// deterministic answer for the current state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }

    /// The domain outcome, if this error is one.
    pub fn as_reward(&self) -> Option<&RewardError> {
        match self {
            CoreError::Reward(e) => Some(e),
            _ => None,
        }
    }
}

/// Reward-rule outcomes returned by the ledger, completion engine,
/// coupon exchange and review queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    /// Task is pending review, cooling down, or already claimed
    #[error("Task '{task_id}' cannot be completed right now")]
    NotEligible { task_id: String },

    /// Debit larger than the current balance
    #[error("Insufficient funds: need {needed} coins, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    /// Referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Approve/reject on a record that is no longer pending
    #[error("{entity} '{id}' has already been decided")]
    AlreadyDecided { entity: &'static str, id: String },

    /// Coupon was redeemed; no further requests possible
    #[error("Coupon '{id}' has already been redeemed")]
    AlreadyRedeemed { id: String },

    /// A pending redemption request already exists for the coupon
    #[error("Coupon '{id}' already has a pending redemption request")]
    AlreadyRequested { id: String },

    /// Catalog has no item with the given id
    #[error("Catalog item not found: {id}")]
    CatalogItemNotFound { id: String },

    /// Coupon is past its validity window (strict expiry policy only)
    #[error("Coupon '{id}' expired at {expires_at}")]
    Expired {
        id: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    /// Identity context lacks the reviewer capability
    #[error("User '{user_id}' is not a reviewer")]
    NotReviewer { user_id: String },
}

/// Storage collaborator failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt {entity} record '{id}': {message}")]
    Corrupt {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Store lock poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,

    /// Could not produce a fresh unique value after several attempts
    #[error("Could not generate a unique {what} after {attempts} attempts")]
    CollisionExhausted { what: &'static str, attempts: u32 },

    /// IO errors (data directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Home/data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Ledger amount does not match the sign its kind requires
    #[error("Amount {amount} is invalid for a {kind} transaction")]
    InvalidAmount { amount: i64, kind: String },

    /// Duplicate id in a collection
    #[error("Duplicate {collection} id: {id}")]
    DuplicateId { collection: String, id: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
