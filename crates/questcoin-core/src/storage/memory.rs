//! In-memory store.
//!
//! A single mutex serializes every transaction. Each transaction works on a
//! copy of the state that replaces the original only when the closure
//! succeeds, so a failed operation leaves no trace.

use std::sync::Mutex;

use super::{Records, Store};
use crate::completion::Completion;
use crate::error::{CoreError, StorageError};
use crate::exchange::{OwnedCoupon, RedemptionRequest};
use crate::ledger::Transaction;
use crate::status::ReviewStatus;

/// Plain vectors in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    transactions: Vec<Transaction>,
    completions: Vec<Completion>,
    owned_coupons: Vec<OwnedCoupon>,
    redemptions: Vec<RedemptionRequest>,
}

fn replace<T, F>(items: &mut [T], entity: &'static str, id: &str, matches: F, value: &T) -> Result<(), StorageError>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    match items.iter_mut().find(|item| matches(item)) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(StorageError::Corrupt {
            entity,
            id: id.to_string(),
            message: "update of a record that was never inserted".into(),
        }),
    }
}

impl Records for MemoryState {
    fn append_transaction(&mut self, tx: &Transaction) -> Result<(), StorageError> {
        self.transactions.push(tx.clone());
        Ok(())
    }

    fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>, StorageError> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    fn insert_completion(&mut self, completion: &Completion) -> Result<(), StorageError> {
        self.completions.push(completion.clone());
        Ok(())
    }

    fn update_completion(&mut self, completion: &Completion) -> Result<(), StorageError> {
        replace(
            &mut self.completions,
            "completion",
            &completion.id,
            |c| c.id == completion.id,
            completion,
        )
    }

    fn completion(&self, id: &str) -> Result<Option<Completion>, StorageError> {
        Ok(self.completions.iter().find(|c| c.id == id).cloned())
    }

    fn completions_for_user(&self, user_id: &str) -> Result<Vec<Completion>, StorageError> {
        Ok(self
            .completions
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    fn completions_with_status(&self, status: ReviewStatus) -> Result<Vec<Completion>, StorageError> {
        Ok(self
            .completions
            .iter()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    fn insert_owned_coupon(&mut self, coupon: &OwnedCoupon) -> Result<(), StorageError> {
        self.owned_coupons.push(coupon.clone());
        Ok(())
    }

    fn update_owned_coupon(&mut self, coupon: &OwnedCoupon) -> Result<(), StorageError> {
        replace(
            &mut self.owned_coupons,
            "owned coupon",
            &coupon.id,
            |c| c.id == coupon.id,
            coupon,
        )
    }

    fn owned_coupon(&self, id: &str) -> Result<Option<OwnedCoupon>, StorageError> {
        Ok(self.owned_coupons.iter().find(|c| c.id == id).cloned())
    }

    fn owned_coupon_by_code(&self, code: &str) -> Result<Option<OwnedCoupon>, StorageError> {
        Ok(self.owned_coupons.iter().find(|c| c.code == code).cloned())
    }

    fn owned_coupons_for(&self, owner_id: &str) -> Result<Vec<OwnedCoupon>, StorageError> {
        Ok(self
            .owned_coupons
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn insert_redemption(&mut self, request: &RedemptionRequest) -> Result<(), StorageError> {
        self.redemptions.push(request.clone());
        Ok(())
    }

    fn update_redemption(&mut self, request: &RedemptionRequest) -> Result<(), StorageError> {
        replace(
            &mut self.redemptions,
            "redemption request",
            &request.id,
            |r| r.id == request.id,
            request,
        )
    }

    fn redemption(&self, id: &str) -> Result<Option<RedemptionRequest>, StorageError> {
        Ok(self.redemptions.iter().find(|r| r.id == id).cloned())
    }

    fn redemptions_for_coupon(
        &self,
        owned_coupon_id: &str,
    ) -> Result<Vec<RedemptionRequest>, StorageError> {
        Ok(self
            .redemptions
            .iter()
            .filter(|r| r.owned_coupon_id == owned_coupon_id)
            .cloned()
            .collect())
    }

    fn redemptions_with_status(
        &self,
        status: ReviewStatus,
    ) -> Result<Vec<RedemptionRequest>, StorageError> {
        Ok(self
            .redemptions
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }
}

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn transaction<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut dyn Records) -> Result<T, CoreError>,
    {
        let mut guard = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        *guard = working;
        Ok(out)
    }

    fn read<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&dyn Records) -> Result<T, CoreError>,
    {
        let guard = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        f(&*guard)
    }
}
