use std::sync::Arc;

use chrono::Duration;

use super::{generate_code, OwnedCoupon, RedemptionRequest, RedemptionStatus};
use crate::catalog::{Catalog, Coupon};
use crate::clock::Clock;
use crate::error::{CoreError, RewardError, StorageError};
use crate::ledger::{Ledger, TransactionKind};
use crate::status::{Decision, ReviewStatus};
use crate::storage::{RecordKind, Records, Store};

const MAX_CODE_ATTEMPTS: u32 = 8;

/// Purchase and redemption rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangePolicy {
    /// How long a purchased coupon stays valid.
    pub validity: Duration,
    /// When false, redemption requests on expired coupons fail with `Expired`.
    pub allow_expired_redemption: bool,
}

impl Default for ExchangePolicy {
    fn default() -> Self {
        Self {
            validity: Duration::days(30),
            allow_expired_redemption: true,
        }
    }
}

/// Sells catalog coupons against the ledger and tracks their redemption.
pub struct CouponExchange<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ledger: Ledger<S>,
    catalog: Arc<dyn Catalog>,
    policy: ExchangePolicy,
}

impl<S> Clone for CouponExchange<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            ledger: self.ledger.clone(),
            catalog: Arc::clone(&self.catalog),
            policy: self.policy,
        }
    }
}

impl<S: Store> CouponExchange<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        ledger: Ledger<S>,
        catalog: Arc<dyn Catalog>,
        policy: ExchangePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            ledger,
            catalog,
            policy,
        }
    }

    pub fn policy(&self) -> &ExchangePolicy {
        &self.policy
    }

    /// Catalog coupons, cheapest first.
    pub fn offers(&self) -> Vec<Coupon> {
        let mut coupons = self.catalog.coupons();
        coupons.sort_by(|a, b| a.cost.cmp(&b.cost).then_with(|| a.title.cmp(&b.title)));
        coupons
    }

    /// Buy `coupon_id` for `user_id`.
    ///
    /// The debit and the owned coupon are written in one store transaction:
    /// either both exist afterwards or neither does.
    ///
    /// # Errors
    /// `CatalogItemNotFound` for an unknown coupon, `InsufficientFunds` when
    /// the balance does not cover the cost.
    pub fn purchase(&self, user_id: &str, coupon_id: &str) -> Result<OwnedCoupon, CoreError> {
        let coupon = self
            .catalog
            .coupon(coupon_id)
            .ok_or_else(|| RewardError::CatalogItemNotFound {
                id: coupon_id.to_string(),
            })?;
        let cost = i64::from(coupon.cost);

        self.store.transaction(|records| {
            let available = self.ledger.balance_in(&*records, user_id)?;
            if available < cost {
                return Err(RewardError::InsufficientFunds {
                    needed: cost,
                    available,
                }
                .into());
            }

            let now = self.clock.now();
            let owned = OwnedCoupon {
                id: records.new_id(RecordKind::OwnedCoupon),
                coupon_id: coupon.id.clone(),
                owner_id: user_id.to_string(),
                title: coupon.title.clone(),
                cost: coupon.cost,
                code: unique_code(&*records)?,
                purchased_at: now,
                expires_at: now + self.policy.validity,
                status: RedemptionStatus::Unredeemed,
            };
            records.insert_owned_coupon(&owned)?;
            self.ledger.append(
                records,
                user_id,
                -cost,
                TransactionKind::Spend,
                &owned.id,
                &format!("Purchased: {}", coupon.title),
            )?;

            tracing::info!(
                user_id,
                coupon_id,
                owned_coupon_id = %owned.id,
                cost,
                "coupon purchased"
            );
            Ok(owned)
        })
    }

    /// Ask a reviewer to mark an owned coupon as used.
    ///
    /// # Errors
    /// `NotFound`, `AlreadyRedeemed`, `AlreadyRequested`, or `Expired` when
    /// the policy refuses expired coupons.
    pub fn request_redemption(&self, owned_coupon_id: &str) -> Result<RedemptionRequest, CoreError> {
        self.store.transaction(|records| {
            let mut owned = load_owned(&*records, owned_coupon_id)?;
            if owned.status == RedemptionStatus::Redeemed {
                return Err(RewardError::AlreadyRedeemed {
                    id: owned.id.clone(),
                }
                .into());
            }

            let has_pending = records
                .redemptions_for_coupon(&owned.id)?
                .iter()
                .any(|r| r.status == ReviewStatus::Pending);
            if has_pending || owned.status == RedemptionStatus::RedemptionRequested {
                return Err(RewardError::AlreadyRequested {
                    id: owned.id.clone(),
                }
                .into());
            }

            let now = self.clock.now();
            if !self.policy.allow_expired_redemption && owned.is_expired_at(now) {
                return Err(RewardError::Expired {
                    id: owned.id.clone(),
                    expires_at: owned.expires_at,
                }
                .into());
            }

            let request = RedemptionRequest {
                id: records.new_id(RecordKind::RedemptionRequest),
                owned_coupon_id: owned.id.clone(),
                owner_id: owned.owner_id.clone(),
                status: ReviewStatus::Pending,
                created_at: now,
                decided_at: None,
            };
            records.insert_redemption(&request)?;
            owned.status = RedemptionStatus::RedemptionRequested;
            records.update_owned_coupon(&owned)?;

            tracing::info!(
                owned_coupon_id,
                request_id = %request.id,
                "redemption requested"
            );
            Ok(request)
        })
    }

    /// Approve a pending request; the coupon becomes `Redeemed` for good.
    pub fn approve_redemption(&self, request_id: &str) -> Result<RedemptionRequest, CoreError> {
        self.decide(request_id, Decision::Approve)
    }

    /// Reject a pending request; the coupon returns to `Unredeemed`.
    pub fn reject_redemption(&self, request_id: &str) -> Result<RedemptionRequest, CoreError> {
        self.decide(request_id, Decision::Reject)
    }

    fn decide(&self, request_id: &str, decision: Decision) -> Result<RedemptionRequest, CoreError> {
        self.store.transaction(|records| {
            let mut request =
                records
                    .redemption(request_id)?
                    .ok_or_else(|| RewardError::NotFound {
                        entity: "redemption request",
                        id: request_id.to_string(),
                    })?;
            if request.status.is_terminal() {
                return Err(RewardError::AlreadyDecided {
                    entity: "redemption request",
                    id: request_id.to_string(),
                }
                .into());
            }
            let mut owned = load_owned(&*records, &request.owned_coupon_id)?;

            request.status = decision.outcome();
            request.decided_at = Some(self.clock.now());
            owned.status = match decision {
                Decision::Approve => RedemptionStatus::Redeemed,
                Decision::Reject => RedemptionStatus::Unredeemed,
            };
            records.update_redemption(&request)?;
            records.update_owned_coupon(&owned)?;

            tracing::info!(
                request_id,
                owned_coupon_id = %owned.id,
                status = %request.status,
                "redemption decided"
            );
            Ok(request)
        })
    }

    pub fn owned_coupon(&self, owned_coupon_id: &str) -> Result<OwnedCoupon, CoreError> {
        self.store.read(|records| load_owned(records, owned_coupon_id))
    }

    /// A user's coupons, most recently purchased first.
    pub fn owned_coupons(&self, user_id: &str) -> Result<Vec<OwnedCoupon>, CoreError> {
        let mut coupons = self.store.read(|records| Ok(records.owned_coupons_for(user_id)?))?;
        coupons.reverse();
        coupons.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(coupons)
    }

    /// Look up a coupon by the code a merchant was shown.
    pub fn find_by_code(&self, code: &str) -> Result<Option<OwnedCoupon>, CoreError> {
        let code = code.trim().to_ascii_uppercase();
        self.store.read(|records| Ok(records.owned_coupon_by_code(&code)?))
    }

    /// Every redemption request made for an owned coupon, oldest first.
    pub fn redemptions_for(&self, owned_coupon_id: &str) -> Result<Vec<RedemptionRequest>, CoreError> {
        self.store
            .read(|records| Ok(records.redemptions_for_coupon(owned_coupon_id)?))
    }
}

fn load_owned(records: &dyn Records, owned_coupon_id: &str) -> Result<OwnedCoupon, CoreError> {
    records
        .owned_coupon(owned_coupon_id)?
        .ok_or_else(|| {
            RewardError::NotFound {
                entity: "owned coupon",
                id: owned_coupon_id.to_string(),
            }
            .into()
        })
}

fn unique_code(records: &dyn Records) -> Result<String, CoreError> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate_code();
        if records.owned_coupon_by_code(&code)?.is_none() {
            return Ok(code);
        }
        tracing::warn!(attempt, "redemption code collision, regenerating");
    }
    Err(StorageError::CollisionExhausted {
        what: "redemption code",
        attempts: MAX_CODE_ATTEMPTS,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        ledger: Ledger<MemoryStore>,
        exchange: CouponExchange<MemoryStore>,
    }

    fn fixture(initial: u32, policy: ExchangePolicy) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let ledger = Ledger::new(store.clone(), clock.clone(), initial);
        let catalog = StaticCatalog::new(
            vec![],
            vec![Coupon::new("gear", "FitGear Pro", 75), Coupon::new("tea", "Tea House", 30)],
        )
        .unwrap();
        let exchange = CouponExchange::new(
            store,
            clock.clone(),
            ledger.clone(),
            Arc::new(catalog),
            policy,
        );
        Fixture {
            clock,
            ledger,
            exchange,
        }
    }

    #[test]
    fn purchase_debits_and_issues_coupon() {
        let f = fixture(100, ExchangePolicy::default());
        let owned = f.exchange.purchase("u1", "gear").unwrap();

        assert_eq!(owned.status, RedemptionStatus::Unredeemed);
        assert_eq!(owned.cost, 75);
        assert_eq!(owned.expires_at - owned.purchased_at, Duration::days(30));
        assert_eq!(f.ledger.balance("u1").unwrap(), 25);

        let tx = &f.ledger.history("u1").unwrap()[0];
        assert_eq!(tx.kind, TransactionKind::Spend);
        assert_eq!(tx.amount, -75);
        assert_eq!(tx.reference_id, owned.id);
        assert_eq!(tx.description, "Purchased: FitGear Pro");
    }

    #[test]
    fn insufficient_funds_creates_nothing() {
        let f = fixture(50, ExchangePolicy::default());
        let err = f.exchange.purchase("u1", "gear").unwrap_err();
        assert_eq!(
            err.as_reward(),
            Some(&RewardError::InsufficientFunds {
                needed: 75,
                available: 50
            })
        );
        assert_eq!(f.ledger.balance("u1").unwrap(), 50);
        assert!(f.ledger.history("u1").unwrap().is_empty());
        assert!(f.exchange.owned_coupons("u1").unwrap().is_empty());
    }

    #[test]
    fn unknown_coupon_is_catalog_miss() {
        let f = fixture(500, ExchangePolicy::default());
        let err = f.exchange.purchase("u1", "yacht").unwrap_err();
        assert!(matches!(
            err.as_reward(),
            Some(RewardError::CatalogItemNotFound { .. })
        ));
    }

    #[test]
    fn redemption_round_trip_approved() {
        let f = fixture(100, ExchangePolicy::default());
        let owned = f.exchange.purchase("u1", "tea").unwrap();

        let request = f.exchange.request_redemption(&owned.id).unwrap();
        assert_eq!(request.status, ReviewStatus::Pending);
        assert_eq!(
            f.exchange.owned_coupon(&owned.id).unwrap().status,
            RedemptionStatus::RedemptionRequested
        );

        let approved = f.exchange.approve_redemption(&request.id).unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert!(approved.decided_at.is_some());
        assert_eq!(
            f.exchange.owned_coupon(&owned.id).unwrap().status,
            RedemptionStatus::Redeemed
        );

        let err = f.exchange.request_redemption(&owned.id).unwrap_err();
        assert!(matches!(err.as_reward(), Some(RewardError::AlreadyRedeemed { .. })));
        assert_eq!(f.exchange.redemptions_for(&owned.id).unwrap().len(), 1);
    }

    #[test]
    fn rejected_redemption_can_be_requested_again() {
        let f = fixture(100, ExchangePolicy::default());
        let owned = f.exchange.purchase("u1", "tea").unwrap();
        let first = f.exchange.request_redemption(&owned.id).unwrap();

        f.exchange.reject_redemption(&first.id).unwrap();
        assert_eq!(
            f.exchange.owned_coupon(&owned.id).unwrap().status,
            RedemptionStatus::Unredeemed
        );

        let second = f.exchange.request_redemption(&owned.id).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn duplicate_request_is_refused() {
        let f = fixture(100, ExchangePolicy::default());
        let owned = f.exchange.purchase("u1", "tea").unwrap();
        f.exchange.request_redemption(&owned.id).unwrap();

        let err = f.exchange.request_redemption(&owned.id).unwrap_err();
        assert!(matches!(err.as_reward(), Some(RewardError::AlreadyRequested { .. })));
        assert_eq!(f.exchange.redemptions_for(&owned.id).unwrap().len(), 1);
    }

    #[test]
    fn decided_request_cannot_be_decided_again() {
        let f = fixture(100, ExchangePolicy::default());
        let owned = f.exchange.purchase("u1", "tea").unwrap();
        let request = f.exchange.request_redemption(&owned.id).unwrap();
        f.exchange.reject_redemption(&request.id).unwrap();

        let err = f.exchange.approve_redemption(&request.id).unwrap_err();
        assert!(matches!(err.as_reward(), Some(RewardError::AlreadyDecided { .. })));
        assert_eq!(
            f.exchange.owned_coupon(&owned.id).unwrap().status,
            RedemptionStatus::Unredeemed
        );
    }

    #[test]
    fn expired_coupon_redeemable_by_default() {
        let f = fixture(100, ExchangePolicy::default());
        let owned = f.exchange.purchase("u1", "tea").unwrap();
        f.clock.advance(Duration::days(31));
        assert!(f.exchange.request_redemption(&owned.id).is_ok());
    }

    #[test]
    fn strict_policy_refuses_expired_coupon() {
        let policy = ExchangePolicy {
            allow_expired_redemption: false,
            ..ExchangePolicy::default()
        };
        let f = fixture(100, policy);
        let owned = f.exchange.purchase("u1", "tea").unwrap();

        f.clock.advance(Duration::days(30));
        assert!(f.exchange.request_redemption(&owned.id).is_ok());

        let other = f.exchange.purchase("u1", "tea").unwrap();
        f.clock.advance(Duration::days(30) + Duration::seconds(1));
        let err = f.exchange.request_redemption(&other.id).unwrap_err();
        assert!(matches!(err.as_reward(), Some(RewardError::Expired { .. })));
        assert_eq!(
            f.exchange.owned_coupon(&other.id).unwrap().status,
            RedemptionStatus::Unredeemed
        );
    }

    #[test]
    fn lookup_by_code_and_listing() {
        let f = fixture(100, ExchangePolicy::default());
        let first = f.exchange.purchase("u1", "tea").unwrap();
        f.clock.advance(Duration::minutes(1));
        let second = f.exchange.purchase("u1", "tea").unwrap();
        assert_ne!(first.code, second.code);

        let found = f
            .exchange
            .find_by_code(&first.code.to_ascii_lowercase())
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
        assert!(f.exchange.find_by_code("NOPE").unwrap().is_none());

        let ids: Vec<_> = f
            .exchange
            .owned_coupons("u1")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn offers_are_cheapest_first() {
        let f = fixture(0, ExchangePolicy::default());
        let costs: Vec<_> = f.exchange.offers().iter().map(|c| c.cost).collect();
        assert_eq!(costs, vec![30, 75]);
    }
}
