//! Task completions and the per-(user, task) eligibility state machine.
//!
//! ```text
//!   no history ──complete──> Pending ──approve──> Approved ─┐
//!        │                      └─────reject───> Rejected   │ cooldown
//!        └──complete (no verification)──> Approved          │ elapsed
//!                                                           v
//!                                                       Available
//! ```
//!
//! Eligibility is derived from the *last* completion for the pair: the one
//! with the latest submission timestamp, and among equal timestamps the one
//! inserted last.

mod engine;

pub use engine::TaskCompletionEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Task, TaskKind};
use crate::status::ReviewStatus;

/// A user's submission of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    /// Task title at submission time
    pub task_title: String,
    /// Reward at submission time; approval credits exactly this
    pub reward: u32,
    pub status: ReviewStatus,
    pub submitted_at: DateTime<Utc>,
    /// Optional proof reference (photo URL, note)
    pub proof: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Whether a user may complete a task now, and if not, why.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Eligibility {
    Available,
    /// Last submission is still waiting for a reviewer.
    AwaitingReview,
    /// Recurring task approved less than one cooldown ago.
    CoolingDown { ready_at: DateTime<Utc> },
    /// One-shot task already approved.
    Claimed,
}

impl Eligibility {
    pub fn is_available(&self) -> bool {
        matches!(self, Eligibility::Available)
    }
}

/// The last completion in `history` (insertion-ordered).
///
/// Latest `submitted_at` wins; on equal timestamps the later-inserted
/// record wins.
pub fn last_completion(history: &[Completion]) -> Option<&Completion> {
    history
        .iter()
        .enumerate()
        .max_by_key(|(index, c)| (c.submitted_at, *index))
        .map(|(_, c)| c)
}

/// Evaluate eligibility of `task` given the user's completions of it.
pub fn evaluate(task: &Task, history: &[Completion], now: DateTime<Utc>) -> Eligibility {
    let Some(last) = last_completion(history) else {
        return Eligibility::Available;
    };

    if last.status == ReviewStatus::Pending {
        return Eligibility::AwaitingReview;
    }

    match task.kind {
        TaskKind::Single => {
            if history.iter().any(|c| c.status == ReviewStatus::Approved) {
                Eligibility::Claimed
            } else {
                Eligibility::Available
            }
        }
        TaskKind::Recurring => match last.status {
            ReviewStatus::Approved => {
                let ready_at = last.submitted_at + task.cooldown();
                if now >= ready_at {
                    Eligibility::Available
                } else {
                    Eligibility::CoolingDown { ready_at }
                }
            }
            _ => Eligibility::Available,
        },
    }
}
