use clap::Subcommand;

use super::{print_json, Context, Global};

#[derive(Subcommand)]
pub enum WalletAction {
    /// Balance with earned/spent totals
    Balance,
    /// Transactions, newest first
    History,
}

pub fn run(action: WalletAction, global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(global)?;
    let ledger = ctx.rewards.ledger();

    match action {
        WalletAction::Balance => print_json(&ledger.summary(ctx.user_id())?)?,
        WalletAction::History => print_json(&ledger.history(ctx.user_id())?)?,
    }
    Ok(())
}
