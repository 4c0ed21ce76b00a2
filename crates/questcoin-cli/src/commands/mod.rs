pub mod config;
pub mod coupon;
pub mod review;
pub mod shop;
pub mod task;
pub mod wallet;

use std::sync::Arc;

use questcoin_core::{Config, CoreError, Identity, Rewards, SqliteStore, StaticCatalog, SystemClock};

/// Flags accepted by every subcommand.
pub struct Global {
    pub user: Option<String>,
    pub reviewer: bool,
}

/// Caller identity plus the reward components over the on-disk database.
pub struct Context {
    pub identity: Identity,
    pub rewards: Rewards<SqliteStore>,
}

impl Context {
    pub fn open(global: &Global) -> Result<Self, CoreError> {
        let config = Config::load()?;
        let catalog = StaticCatalog::load_or_seed()?;
        let store = SqliteStore::open()?;
        let identity = Identity {
            user_id: global
                .user
                .clone()
                .unwrap_or_else(|| config.identity.default_user.clone()),
            is_reviewer: global.reviewer,
        };
        tracing::debug!(user_id = %identity.user_id, reviewer = identity.is_reviewer, "identity resolved");
        let rewards = Rewards::new(
            Arc::new(store),
            Arc::new(SystemClock),
            Arc::new(catalog),
            &config,
        );
        Ok(Self {
            identity,
            rewards,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
