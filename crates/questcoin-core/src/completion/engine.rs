use std::sync::Arc;

use super::{evaluate, last_completion, Completion, Eligibility};
use crate::catalog::Task;
use crate::clock::Clock;
use crate::error::{CoreError, RewardError};
use crate::ledger::{Ledger, TransactionKind};
use crate::status::{Decision, ReviewStatus};
use crate::storage::{RecordKind, Store};

/// Creates completions and applies review decisions to them.
pub struct TaskCompletionEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ledger: Ledger<S>,
}

impl<S> Clone for TaskCompletionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: Store> TaskCompletionEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, ledger: Ledger<S>) -> Self {
        Self {
            store,
            clock,
            ledger,
        }
    }

    pub fn eligibility(&self, user_id: &str, task: &Task) -> Result<Eligibility, CoreError> {
        let history = self
            .store
            .read(|records| Ok(records.completions_for_task(user_id, &task.id)?))?;
        let eligibility = evaluate(task, &history, self.clock.now());
        tracing::debug!(user_id, task_id = %task.id, ?eligibility, "eligibility evaluated");
        Ok(eligibility)
    }

    pub fn can_complete(&self, user_id: &str, task: &Task) -> Result<bool, CoreError> {
        Ok(self.eligibility(user_id, task)?.is_available())
    }

    pub fn last_completion(&self, user_id: &str, task_id: &str) -> Result<Option<Completion>, CoreError> {
        let history = self
            .store
            .read(|records| Ok(records.completions_for_task(user_id, task_id)?))?;
        Ok(last_completion(&history).cloned())
    }

    /// Submit a completion of `task`.
    ///
    /// Tasks without verification are approved and credited immediately;
    /// the rest wait in the review queue.
    ///
    /// # Errors
    /// `NotEligible` when the task is pending review, cooling down, or
    /// already claimed.
    pub fn complete(
        &self,
        user_id: &str,
        task: &Task,
        proof: Option<String>,
    ) -> Result<Completion, CoreError> {
        self.store.transaction(|records| {
            let now = self.clock.now();
            let history = records.completions_for_task(user_id, &task.id)?;
            if !evaluate(task, &history, now).is_available() {
                return Err(RewardError::NotEligible {
                    task_id: task.id.clone(),
                }
                .into());
            }

            let auto_approved = !task.requires_verification;
            let completion = Completion {
                id: records.new_id(RecordKind::Completion),
                task_id: task.id.clone(),
                user_id: user_id.to_string(),
                task_title: task.title.clone(),
                reward: task.reward,
                status: if auto_approved {
                    ReviewStatus::Approved
                } else {
                    ReviewStatus::Pending
                },
                submitted_at: now,
                proof,
                decided_at: auto_approved.then_some(now),
            };
            records.insert_completion(&completion)?;

            if auto_approved {
                self.ledger.append(
                    records,
                    user_id,
                    i64::from(completion.reward),
                    TransactionKind::Earn,
                    &completion.id,
                    &format!("Completed: {}", task.title),
                )?;
            }

            tracing::info!(
                user_id,
                task_id = %task.id,
                completion_id = %completion.id,
                status = %completion.status,
                "task completion submitted"
            );
            Ok(completion)
        })
    }

    /// Approve a pending completion and credit its reward.
    pub fn approve(&self, completion_id: &str) -> Result<Completion, CoreError> {
        self.decide(completion_id, Decision::Approve)
    }

    /// Reject a pending completion. No ledger effect.
    pub fn reject(&self, completion_id: &str) -> Result<Completion, CoreError> {
        self.decide(completion_id, Decision::Reject)
    }

    fn decide(&self, completion_id: &str, decision: Decision) -> Result<Completion, CoreError> {
        self.store.transaction(|records| {
            let mut completion =
                records
                    .completion(completion_id)?
                    .ok_or_else(|| RewardError::NotFound {
                        entity: "completion",
                        id: completion_id.to_string(),
                    })?;
            if completion.status.is_terminal() {
                return Err(RewardError::AlreadyDecided {
                    entity: "completion",
                    id: completion_id.to_string(),
                }
                .into());
            }

            completion.status = decision.outcome();
            completion.decided_at = Some(self.clock.now());
            records.update_completion(&completion)?;

            if decision == Decision::Approve {
                self.ledger.append(
                    records,
                    &completion.user_id,
                    i64::from(completion.reward),
                    TransactionKind::Earn,
                    &completion.id,
                    &format!("Approved: {}", completion.task_title),
                )?;
            }

            tracing::info!(
                completion_id,
                user_id = %completion.user_id,
                status = %completion.status,
                "completion decided"
            );
            Ok(completion)
        })
    }

    /// A user's completions, newest first.
    pub fn history(&self, user_id: &str) -> Result<Vec<Completion>, CoreError> {
        let history = self
            .store
            .read(|records| Ok(records.completions_for_user(user_id)?))?;
        let mut indexed: Vec<(usize, Completion)> = history.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| (b.submitted_at, *ib).cmp(&(a.submitted_at, *ia)));
        Ok(indexed.into_iter().map(|(_, c)| c).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        ledger: Ledger<MemoryStore>,
        engine: TaskCompletionEngine<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let ledger = Ledger::new(store.clone(), clock.clone(), 0);
        let engine = TaskCompletionEngine::new(store, clock.clone(), ledger.clone());
        Fixture {
            clock,
            ledger,
            engine,
        }
    }

    #[test]
    fn unverified_task_credits_immediately() {
        let f = fixture();
        let task = Task::new("water", "Drink water", 20);

        let completion = f.engine.complete("u1", &task, None).unwrap();
        assert_eq!(completion.status, ReviewStatus::Approved);
        assert!(completion.decided_at.is_some());
        assert_eq!(f.ledger.balance("u1").unwrap(), 20);

        let history = f.ledger.history("u1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Earn);
        assert_eq!(history[0].reference_id, completion.id);
        assert_eq!(history[0].description, "Completed: Drink water");
    }

    #[test]
    fn cooldown_blocks_second_completion() {
        let f = fixture();
        let task = Task::new("water", "Drink water", 20);
        f.engine.complete("u1", &task, None).unwrap();

        f.clock.advance(Duration::hours(23) + Duration::minutes(59));
        let err = f.engine.complete("u1", &task, None).unwrap_err();
        assert!(matches!(err.as_reward(), Some(RewardError::NotEligible { .. })));
        assert_eq!(f.ledger.balance("u1").unwrap(), 20);

        f.clock.advance(Duration::minutes(1));
        assert!(f.engine.can_complete("u1", &task).unwrap());
        f.engine.complete("u1", &task, None).unwrap();
        assert_eq!(f.ledger.balance("u1").unwrap(), 40);
    }

    #[test]
    fn verified_task_waits_for_approval() {
        let f = fixture();
        let task = Task::new("diet", "Follow diet", 15).verified();

        let pending = f
            .engine
            .complete("u1", &task, Some("photo://plate".into()))
            .unwrap();
        assert_eq!(pending.status, ReviewStatus::Pending);
        assert_eq!(pending.proof.as_deref(), Some("photo://plate"));
        assert_eq!(f.ledger.balance("u1").unwrap(), 0);
        assert_eq!(
            f.engine.eligibility("u1", &task).unwrap(),
            Eligibility::AwaitingReview
        );

        let approved = f.engine.approve(&pending.id).unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert_eq!(f.ledger.balance("u1").unwrap(), 15);
        assert_eq!(
            f.ledger.history("u1").unwrap()[0].description,
            "Approved: Follow diet"
        );
    }

    #[test]
    fn rejection_leaves_balance_and_reopens_task() {
        let f = fixture();
        let task = Task::new("diet", "Follow diet", 15).verified();
        let pending = f.engine.complete("u1", &task, None).unwrap();

        let rejected = f.engine.reject(&pending.id).unwrap();
        assert_eq!(rejected.status, ReviewStatus::Rejected);
        assert_eq!(f.ledger.balance("u1").unwrap(), 0);
        assert!(f.engine.can_complete("u1", &task).unwrap());
    }

    #[test]
    fn second_decision_fails_without_ledger_effect() {
        let f = fixture();
        let task = Task::new("diet", "Follow diet", 15).verified();
        let pending = f.engine.complete("u1", &task, None).unwrap();
        f.engine.approve(&pending.id).unwrap();

        for result in [f.engine.approve(&pending.id), f.engine.reject(&pending.id)] {
            let err = result.unwrap_err();
            assert!(matches!(err.as_reward(), Some(RewardError::AlreadyDecided { .. })));
        }
        assert_eq!(f.ledger.balance("u1").unwrap(), 15);
        assert_eq!(f.ledger.history("u1").unwrap().len(), 1);
    }

    #[test]
    fn unknown_completion_is_not_found() {
        let f = fixture();
        let err = f.engine.approve("cmp-missing").unwrap_err();
        assert!(matches!(err.as_reward(), Some(RewardError::NotFound { .. })));
    }

    #[test]
    fn one_shot_task_after_approval_never_again() {
        let f = fixture();
        let task = Task::new("profile", "Complete profile", 30).single();
        f.engine.complete("u1", &task, None).unwrap();

        f.clock.advance(Duration::days(365));
        assert_eq!(f.engine.eligibility("u1", &task).unwrap(), Eligibility::Claimed);
        assert!(f.engine.complete("u1", &task, None).is_err());
    }

    #[test]
    fn history_newest_first() {
        let f = fixture();
        let a = Task::new("a", "A", 1);
        let b = Task::new("b", "B", 1);
        f.engine.complete("u1", &a, None).unwrap();
        f.clock.advance(Duration::minutes(5));
        f.engine.complete("u1", &b, None).unwrap();

        let ids: Vec<_> = f
            .engine
            .history("u1")
            .unwrap()
            .into_iter()
            .map(|c| c.task_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(f.engine.last_completion("u1", "a").unwrap().unwrap().task_id, "a");
        assert!(f.engine.last_completion("u2", "a").unwrap().is_none());
    }

    #[test]
    fn users_are_independent() {
        let f = fixture();
        let task = Task::new("water", "Drink water", 10);
        f.engine.complete("u1", &task, None).unwrap();
        assert!(f.engine.can_complete("u2", &task).unwrap());
    }
}
