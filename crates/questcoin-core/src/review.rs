//! Reviewer-facing queue of pending completions and redemption requests.
//!
//! The queue holds no state of its own. Every listing is a fresh query, so
//! iterating again after a decision reflects the decision.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::completion::{Completion, TaskCompletionEngine};
use crate::error::{CoreError, RewardError};
use crate::exchange::{CouponExchange, RedemptionRequest};
use crate::status::{Decision, ReviewStatus};
use crate::storage::Store;

/// Authenticated caller, as supplied by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_reviewer: bool,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_reviewer: false,
        }
    }

    pub fn reviewer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_reviewer: true,
        }
    }

    fn require_reviewer(&self) -> Result<(), RewardError> {
        if self.is_reviewer {
            Ok(())
        } else {
            Err(RewardError::NotReviewer {
                user_id: self.user_id.clone(),
            })
        }
    }
}

/// Which kind of pending record a decision targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewKind {
    Completion,
    Redemption,
}

/// The record after a decision was applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum Decided {
    Completion(Completion),
    Redemption(RedemptionRequest),
}

/// Routes reviewer decisions to the completion engine and coupon exchange.
pub struct ReviewQueue<S> {
    store: Arc<S>,
    completions: TaskCompletionEngine<S>,
    exchange: CouponExchange<S>,
}

impl<S: Store> ReviewQueue<S> {
    pub fn new(
        store: Arc<S>,
        completions: TaskCompletionEngine<S>,
        exchange: CouponExchange<S>,
    ) -> Self {
        Self {
            store,
            completions,
            exchange,
        }
    }

    /// Pending completions, oldest submission first.
    pub fn pending_completions(
        &self,
        reviewer: &Identity,
    ) -> Result<impl Iterator<Item = Completion>, CoreError> {
        reviewer.require_reviewer()?;
        let mut pending = self
            .store
            .read(|records| Ok(records.completions_with_status(ReviewStatus::Pending)?))?;
        // stable: equal timestamps keep insertion order
        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(pending.into_iter())
    }

    /// Pending redemption requests, oldest first.
    pub fn pending_redemptions(
        &self,
        reviewer: &Identity,
    ) -> Result<impl Iterator<Item = RedemptionRequest>, CoreError> {
        reviewer.require_reviewer()?;
        let mut pending = self
            .store
            .read(|records| Ok(records.redemptions_with_status(ReviewStatus::Pending)?))?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending.into_iter())
    }

    /// Apply `decision` to the pending record `id` of the given kind.
    pub fn decide(
        &self,
        reviewer: &Identity,
        kind: ReviewKind,
        id: &str,
        decision: Decision,
    ) -> Result<Decided, CoreError> {
        reviewer.require_reviewer()?;
        tracing::debug!(reviewer = %reviewer.user_id, ?kind, id, ?decision, "review decision");
        match (kind, decision) {
            (ReviewKind::Completion, Decision::Approve) => {
                self.completions.approve(id).map(Decided::Completion)
            }
            (ReviewKind::Completion, Decision::Reject) => {
                self.completions.reject(id).map(Decided::Completion)
            }
            (ReviewKind::Redemption, Decision::Approve) => {
                self.exchange.approve_redemption(id).map(Decided::Redemption)
            }
            (ReviewKind::Redemption, Decision::Reject) => {
                self.exchange.reject_redemption(id).map(Decided::Redemption)
            }
        }
    }
}
