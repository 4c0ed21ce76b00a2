use clap::Subcommand;

use super::{print_json, Context, Global};

#[derive(Subcommand)]
pub enum ShopAction {
    /// Coupons on offer, cheapest first
    List,
    /// Buy a coupon with coins
    Buy {
        /// Coupon ID
        id: String,
    },
}

pub fn run(action: ShopAction, global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(global)?;

    match action {
        ShopAction::List => print_json(&ctx.rewards.exchange().offers())?,
        ShopAction::Buy { id } => {
            let owned = ctx.rewards.exchange().purchase(ctx.user_id(), &id)?;
            print_json(&owned)?;
        }
    }
    Ok(())
}
