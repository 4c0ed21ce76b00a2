//! Reviewer commands. Every action requires `--reviewer`.

use clap::{Subcommand, ValueEnum};
use questcoin_core::{Completion, Decision, RedemptionRequest, ReviewKind};
use serde::Serialize;

use super::{print_json, Context, Global};

#[derive(Clone, Copy, ValueEnum)]
pub enum Target {
    Completion,
    Redemption,
}

impl From<Target> for ReviewKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Completion => ReviewKind::Completion,
            Target::Redemption => ReviewKind::Redemption,
        }
    }
}

#[derive(Subcommand)]
pub enum ReviewAction {
    /// Pending completions and redemption requests, oldest first
    Pending,
    /// Approve a pending item
    Approve {
        #[arg(value_enum)]
        target: Target,
        /// Completion or redemption request ID
        id: String,
    },
    /// Reject a pending item
    Reject {
        #[arg(value_enum)]
        target: Target,
        /// Completion or redemption request ID
        id: String,
    },
}

#[derive(Serialize)]
struct PendingQueue {
    completions: Vec<Completion>,
    redemptions: Vec<RedemptionRequest>,
}

pub fn run(action: ReviewAction, global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(global)?;
    let queue = ctx.rewards.review();

    let (target, id, decision) = match action {
        ReviewAction::Pending => {
            let pending = PendingQueue {
                completions: queue.pending_completions(&ctx.identity)?.collect(),
                redemptions: queue.pending_redemptions(&ctx.identity)?.collect(),
            };
            return print_json(&pending);
        }
        ReviewAction::Approve { target, id } => (target, id, Decision::Approve),
        ReviewAction::Reject { target, id } => (target, id, Decision::Reject),
    };

    let decided = queue.decide(&ctx.identity, target.into(), &id, decision)?;
    print_json(&decided)
}
