//! TOML-backed catalog.
//!
//! Stored at `<data_dir>/catalog.toml`; the first load writes a seed
//! catalog of daily health tasks and partner coupons.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Catalog, Coupon, Task};
use crate::error::{ConfigError, CoreError, ValidationError};
use crate::storage::data_dir;

/// Catalog held entirely in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticCatalog {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub coupons: Vec<Coupon>,
}

impl StaticCatalog {
    pub fn new(tasks: Vec<Task>, coupons: Vec<Coupon>) -> Result<Self, ValidationError> {
        let catalog = Self { tasks, coupons };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check ids are present and unique and amounts are positive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "task.id".into(),
                    message: format!("empty id for task '{}'", task.title),
                });
            }
            if !seen.insert(task.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    collection: "task".into(),
                    id: task.id.clone(),
                });
            }
            if task.reward == 0 {
                return Err(ValidationError::InvalidValue {
                    field: format!("task.{}.reward", task.id),
                    message: "reward must be positive".into(),
                });
            }
        }

        let mut seen = HashSet::new();
        for coupon in &self.coupons {
            if coupon.id.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "coupon.id".into(),
                    message: format!("empty id for coupon '{}'", coupon.title),
                });
            }
            if !seen.insert(coupon.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    collection: "coupon".into(),
                    id: coupon.id.clone(),
                });
            }
            if coupon.cost == 0 {
                return Err(ValidationError::InvalidValue {
                    field: format!("coupon.{}.cost", coupon.id),
                    message: "cost must be positive".into(),
                });
            }
        }
        Ok(())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("catalog.toml"))
    }

    /// Load from the data directory, writing the seed catalog if none exists.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed or fails
    /// validation, or if the seed cannot be written.
    pub fn load_or_seed() -> Result<Self, CoreError> {
        let path = Self::path()?;
        if path.exists() {
            return Self::load_from(&path);
        }
        let catalog = Self::seed();
        catalog.save_to(&path)?;
        Ok(catalog)
    }

    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let catalog: StaticCatalog =
            toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Default catalog written on first run.
    pub fn seed() -> Self {
        let task = |id: &str, title: &str, description: &str, reward: u32, verify: bool, icon: &str| {
            let mut t = Task::new(id, title, reward);
            t.description = description.into();
            t.requires_verification = verify;
            t.icon = Some(icon.into());
            t
        };
        let coupon = |id: &str, title: &str, value: &str, cost: u32, description: &str| {
            let mut c = Coupon::new(id, title, cost);
            c.value = value.into();
            c.description = description.into();
            c
        };

        Self {
            tasks: vec![
                task("diet", "Follow your diet plan", "Stick to your nutrition goals for the day", 15, true, "salad"),
                task("walk", "Take a 30-min walk", "Get moving with a brisk walk outdoors", 20, true, "walk"),
                task("water", "Drink 8 glasses of water", "Stay hydrated throughout the day", 10, false, "water"),
                task("meditate", "Meditate for 10 minutes", "Take time to relax and clear your mind", 12, false, "lotus"),
                task("sleep", "Get 7+ hours of sleep", "Rest well for a productive day", 15, false, "moon"),
                task("workout", "Complete a workout", "Finish a gym session or home workout", 25, true, "muscle"),
            ],
            coupons: vec![
                coupon("healthy-eats", "Healthy Eats", "20% Off", 50, "Valid on any order over $25"),
                coupon("fitgear-pro", "FitGear Pro", "$10 Off", 75, "Discount on workout equipment"),
                coupon("zen-spa", "Zen Spa", "15% Off", 60, "Relaxation and wellness services"),
                coupon("organic-market", "Organic Market", "$5 Off", 35, "Fresh produce and healthy snacks"),
                coupon("yoga-studio", "Yoga Studio", "Free Class", 100, "One complimentary yoga session"),
                coupon("smoothie-bar", "Smoothie Bar", "Buy 1 Get 1", 45, "Any smoothie or acai bowl"),
            ],
        }
    }
}

impl Catalog for StaticCatalog {
    fn task(&self, id: &str) -> Option<Task> {
        self.tasks.iter().find(|t| t.id == id).cloned()
    }

    fn coupon(&self, id: &str) -> Option<Coupon> {
        self.coupons.iter().find(|c| c.id == id).cloned()
    }

    fn tasks(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    fn coupons(&self) -> Vec<Coupon> {
        self.coupons.clone()
    }
}
