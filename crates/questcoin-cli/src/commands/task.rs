//! Task commands: browse, complete, and review one's own submissions.

use clap::Subcommand;
use questcoin_core::{Eligibility, Task};
use serde::Serialize;

use super::{print_json, Context, Global};

#[derive(Subcommand)]
pub enum TaskAction {
    /// List catalog tasks with your current eligibility
    List,
    /// Submit a task completion
    Complete {
        /// Task ID
        id: String,
        /// Reference to supporting evidence (photo URL, note)
        #[arg(long)]
        proof: Option<String>,
    },
    /// Your completions, newest first
    History,
}

#[derive(Serialize)]
struct TaskEntry {
    #[serde(flatten)]
    task: Task,
    eligibility: Eligibility,
}

pub fn run(action: TaskAction, global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(global)?;

    match action {
        TaskAction::List => {
            let entries: Vec<_> = ctx
                .rewards
                .task_board(ctx.user_id())?
                .into_iter()
                .map(|(task, eligibility)| TaskEntry { task, eligibility })
                .collect();
            print_json(&entries)?;
        }
        TaskAction::Complete { id, proof } => {
            let completion = ctx.rewards.complete_task(ctx.user_id(), &id, proof)?;
            print_json(&completion)?;
        }
        TaskAction::History => {
            let history = ctx.rewards.completions().history(ctx.user_id())?;
            print_json(&history)?;
        }
    }
    Ok(())
}
