//! Wiring for the four reward components over one store.

use std::sync::Arc;

use crate::catalog::{Catalog, Task};
use crate::clock::Clock;
use crate::completion::{Completion, Eligibility, TaskCompletionEngine};
use crate::error::{CoreError, RewardError};
use crate::exchange::CouponExchange;
use crate::ledger::Ledger;
use crate::review::ReviewQueue;
use crate::storage::{Config, Store};

/// Ledger, completion engine, coupon exchange and review queue sharing
/// one store, clock and catalog.
pub struct Rewards<S> {
    catalog: Arc<dyn Catalog>,
    ledger: Ledger<S>,
    completions: TaskCompletionEngine<S>,
    exchange: CouponExchange<S>,
    review: ReviewQueue<S>,
}

impl<S: Store> Rewards<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        catalog: Arc<dyn Catalog>,
        config: &Config,
    ) -> Self {
        let ledger = Ledger::new(store.clone(), clock.clone(), config.ledger.initial_balance);
        let completions = TaskCompletionEngine::new(store.clone(), clock.clone(), ledger.clone());
        let exchange = CouponExchange::new(
            store.clone(),
            clock,
            ledger.clone(),
            catalog.clone(),
            config.exchange_policy(),
        );
        let review = ReviewQueue::new(store, completions.clone(), exchange.clone());
        Self {
            catalog,
            ledger,
            completions,
            exchange,
            review,
        }
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn completions(&self) -> &TaskCompletionEngine<S> {
        &self.completions
    }

    pub fn exchange(&self) -> &CouponExchange<S> {
        &self.exchange
    }

    pub fn review(&self) -> &ReviewQueue<S> {
        &self.review
    }

    /// Look up a task by id.
    ///
    /// # Errors
    /// `CatalogItemNotFound` if the catalog has no such task.
    pub fn task(&self, task_id: &str) -> Result<Task, RewardError> {
        self.catalog
            .task(task_id)
            .ok_or_else(|| RewardError::CatalogItemNotFound {
                id: task_id.to_string(),
            })
    }

    /// Every catalog task with the user's current eligibility.
    pub fn task_board(&self, user_id: &str) -> Result<Vec<(Task, Eligibility)>, CoreError> {
        self.catalog
            .tasks()
            .into_iter()
            .map(|task| {
                let eligibility = self.completions.eligibility(user_id, &task)?;
                Ok((task, eligibility))
            })
            .collect()
    }

    /// Complete the catalog task `task_id` for `user_id`.
    pub fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        proof: Option<String>,
    ) -> Result<Completion, CoreError> {
        let task = self.task(task_id)?;
        self.completions.complete(user_id, &task, proof)
    }
}
