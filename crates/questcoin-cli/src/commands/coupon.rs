//! Owned coupon commands.

use chrono::Utc;
use clap::Subcommand;
use questcoin_core::{OwnedCoupon, RewardError};
use serde::Serialize;

use super::{print_json, Context, Global};

#[derive(Subcommand)]
pub enum CouponAction {
    /// Your coupons, newest purchase first
    List,
    /// Ask a reviewer to approve redeeming a coupon
    Redeem {
        /// Owned coupon ID
        id: String,
    },
    /// Look up a coupon by its redemption code
    Lookup {
        /// Redemption code (case-insensitive)
        code: String,
    },
}

#[derive(Serialize)]
struct CouponEntry {
    #[serde(flatten)]
    coupon: OwnedCoupon,
    expired: bool,
}

pub fn run(action: CouponAction, global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(global)?;
    let exchange = ctx.rewards.exchange();

    match action {
        CouponAction::List => {
            let now = Utc::now();
            let entries: Vec<_> = exchange
                .owned_coupons(ctx.user_id())?
                .into_iter()
                .map(|coupon| CouponEntry {
                    expired: coupon.is_expired_at(now),
                    coupon,
                })
                .collect();
            print_json(&entries)?;
        }
        CouponAction::Redeem { id } => {
            let owned = exchange.owned_coupon(&id)?;
            if owned.owner_id != ctx.user_id() {
                return Err(RewardError::NotFound {
                    entity: "owned coupon",
                    id,
                }
                .into());
            }
            print_json(&exchange.request_redemption(&id)?)?;
        }
        CouponAction::Lookup { code } => match exchange.find_by_code(&code)? {
            Some(coupon) => print_json(&coupon)?,
            None => {
                return Err(RewardError::NotFound {
                    entity: "coupon code",
                    id: code,
                }
                .into())
            }
        },
    }
    Ok(())
}
