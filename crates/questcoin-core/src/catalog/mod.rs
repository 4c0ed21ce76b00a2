//! Catalog entries: tasks that earn coins and coupons that cost coins.
//!
//! Catalog records are immutable from the core's point of view; they are
//! created and edited by a reviewer-facing collaborator. The core only looks
//! them up through the [`Catalog`] trait.

mod static_catalog;

pub use static_catalog::StaticCatalog;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Whether a task can be completed more than once.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// One-shot: credited at most once per user.
    Single,
    /// Repeatable after the cooldown has elapsed.
    #[default]
    Recurring,
}

/// A task users complete to earn coins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Coins credited on approval (positive)
    pub reward: u32,
    #[serde(default)]
    pub requires_verification: bool,
    #[serde(default)]
    pub kind: TaskKind,
    /// Minimum hours between approved completions (recurring tasks only)
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u32,
    #[serde(default)]
    pub icon: Option<String>,
}

fn default_cooldown_hours() -> u32 {
    24
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, reward: u32) -> Self {
        Task {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            reward,
            requires_verification: false,
            kind: TaskKind::Recurring,
            cooldown_hours: default_cooldown_hours(),
            icon: None,
        }
    }

    pub fn verified(mut self) -> Self {
        self.requires_verification = true;
        self
    }

    pub fn single(mut self) -> Self {
        self.kind = TaskKind::Single;
        self
    }

    pub fn with_cooldown_hours(mut self, hours: u32) -> Self {
        self.cooldown_hours = hours;
        self
    }

    pub fn is_repeatable(&self) -> bool {
        self.kind == TaskKind::Recurring
    }

    pub fn cooldown(&self) -> Duration {
        Duration::hours(i64::from(self.cooldown_hours))
    }
}

/// A coupon users can buy with coins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coupon {
    pub id: String,
    /// Merchant or offer name
    pub title: String,
    /// Price in coins (positive)
    pub cost: u32,
    #[serde(default)]
    pub description: String,
    /// Display value, e.g. "20% Off"
    #[serde(default)]
    pub value: String,
}

impl Coupon {
    pub fn new(id: impl Into<String>, title: impl Into<String>, cost: u32) -> Self {
        Coupon {
            id: id.into(),
            title: title.into(),
            cost,
            description: String::new(),
            value: String::new(),
        }
    }
}

/// Read access to tasks and coupons.
pub trait Catalog: Send + Sync {
    fn task(&self, id: &str) -> Option<Task>;

    fn coupon(&self, id: &str) -> Option<Coupon>;

    fn tasks(&self) -> Vec<Task>;

    fn coupons(&self) -> Vec<Coupon>;
}
