//! Coupon purchases and the redemption-approval lifecycle.
//!
//! Owned coupon status only moves along these edges:
//!
//! ```text
//!   Unredeemed ──request──> RedemptionRequested ──approve──> Redeemed
//!        ^                          │
//!        └──────────reject──────────┘
//! ```

mod code;
mod engine;

pub use code::{generate_code, CODE_LEN};
pub use engine::{CouponExchange, ExchangePolicy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::ReviewStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Unredeemed,
    RedemptionRequested,
    Redeemed,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Unredeemed => "unredeemed",
            RedemptionStatus::RedemptionRequested => "redemption_requested",
            RedemptionStatus::Redeemed => "redeemed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unredeemed" => Some(RedemptionStatus::Unredeemed),
            "redemption_requested" => Some(RedemptionStatus::RedemptionRequested),
            "redeemed" => Some(RedemptionStatus::Redeemed),
            _ => None,
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchased coupon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedCoupon {
    pub id: String,
    pub coupon_id: String,
    pub owner_id: String,
    /// Coupon title at purchase time
    pub title: String,
    /// Price paid
    pub cost: u32,
    /// Unique redemption code shown to the merchant
    pub code: String,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: RedemptionStatus,
}

impl OwnedCoupon {
    /// Expiry is informational unless the exchange policy enforces it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A request to have an owned coupon marked as used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedemptionRequest {
    pub id: String,
    pub owned_coupon_id: String,
    pub owner_id: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}
