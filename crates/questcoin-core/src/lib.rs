//! # QuestCoin Core Library
//!
//! This library provides the reward rules behind QuestCoin: users complete
//! wellness tasks to earn coins and spend them on partner coupons, with a
//! reviewer approving anything that needs verification. All operations are
//! available through the standalone CLI binary, which is a thin layer over
//! the same core library.
//!
//! ## Architecture
//!
//! - **Ledger**: Append-only coin transactions; balance is always derived
//! - **Completions**: Per-(user, task) eligibility state machine with cooldowns
//! - **Exchange**: Coupon purchase and redemption-approval lifecycle
//! - **Review**: Reviewer-gated queue of pending items
//! - **Storage**: SQLite or in-memory records plus TOML configuration
//!
//! ## Key Components
//!
//! - [`Ledger`]: Balance and transaction history
//! - [`TaskCompletionEngine`]: Task eligibility and completion
//! - [`CouponExchange`]: Coupon purchases and redemptions
//! - [`ReviewQueue`]: Approve or reject pending items
//! - [`Rewards`]: All of the above over one store

pub mod catalog;
pub mod clock;
pub mod completion;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod review;
pub mod rewards;
pub mod status;
pub mod storage;

pub use catalog::{Catalog, Coupon, StaticCatalog, Task, TaskKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{Completion, Eligibility, TaskCompletionEngine};
pub use error::{ConfigError, CoreError, RewardError, StorageError, ValidationError};
pub use exchange::{CouponExchange, ExchangePolicy, OwnedCoupon, RedemptionRequest, RedemptionStatus};
pub use ledger::{Ledger, Transaction, TransactionKind, WalletSummary};
pub use review::{Decided, Identity, ReviewKind, ReviewQueue};
pub use rewards::Rewards;
pub use status::{Decision, ReviewStatus};
pub use storage::{Config, MemoryStore, SqliteStore, Store};
