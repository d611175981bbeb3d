//! Persistence contracts the simulation depends on
//!
//! All traits are synchronous. The scheduler calls them from blocking worker
//! tasks, and the session registry calls them from short critical sections.

mod json_dir;
mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ReferenceError, StoreError},
    plant::PlantRecord,
    species::{FertilizerType, ReferenceCatalog, SpeciesProfile},
    weather::WeatherSeries,
};

/// Activity signal the scheduler reads to decide who it may touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    /// Fixed offset of the user's local time, used for weather hour lookup.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl UserActivity {
    pub fn new(user_id: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self {
            user_id: user_id.into(),
            is_playing: false,
            last_active: None,
            utc_offset_minutes,
        }
    }

    /// Marked as playing but silent for longer than `threshold_secs`.
    pub fn is_idle(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        match self.last_active {
            Some(at) => (now - at).num_seconds() > threshold_secs,
            None => true,
        }
    }
}

/// Field-level update for one plant. Applying the same patch twice leaves the
/// record as applying it once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moisture: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shade_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_growth_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disease_check: Option<DateTime<Utc>>,
}

impl PlantPatch {
    pub fn apply(&self, plant: &mut PlantRecord) {
        if let Some(moisture) = self.moisture {
            plant.moisture = moisture;
        }
        if let Some(nutrient) = self.nutrient {
            plant.nutrient = nutrient;
        }
        if let Some(shade) = self.shade_active {
            plant.shade_active = shade;
        }
        if let Some(at) = self.last_growth_update {
            plant.last_growth_update = Some(at);
        }
        if let Some(at) = self.last_disease_check {
            plant.last_disease_check = Some(at);
        }
        plant.normalize();
    }
}

pub trait PlantStore: Send + Sync {
    fn plants_for_user(&self, user: &str) -> Result<Vec<PlantRecord>, StoreError>;

    /// Writes every record or none of them.
    fn upsert_batch(&self, user: &str, records: &[PlantRecord]) -> Result<(), StoreError>;

    fn update_plant(&self, user: &str, plant_id: &str, patch: &PlantPatch)
        -> Result<(), StoreError>;

    /// Returns false when there was nothing to remove.
    fn remove_plant(&self, user: &str, plant_id: &str) -> Result<bool, StoreError>;
}

pub trait UserDirectory: Send + Sync {
    fn users(&self) -> Result<Vec<UserActivity>, StoreError>;
    fn user(&self, user: &str) -> Result<Option<UserActivity>, StoreError>;
    fn upsert_user(&self, activity: UserActivity) -> Result<(), StoreError>;

    fn mark_active(&self, user: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut activity = self
            .user(user)?
            .unwrap_or_else(|| UserActivity::new(user, 0));
        activity.is_playing = true;
        activity.last_active = Some(at);
        self.upsert_user(activity)
    }

    fn mark_inactive(&self, user: &str) -> Result<(), StoreError> {
        let Some(mut activity) = self.user(user)? else {
            return Err(StoreError::NotFound(format!("user {user}")));
        };
        activity.is_playing = false;
        self.upsert_user(activity)
    }
}

pub trait WeatherStore: Send + Sync {
    fn series_for_user(&self, user: &str) -> Result<Option<WeatherSeries>, StoreError>;
    fn put_series(&self, user: &str, series: WeatherSeries) -> Result<(), StoreError>;
}

/// Where species and fertilizer records come from before caching.
pub trait ReferenceSource: Send + Sync {
    fn load_species(&self, name: &str) -> Result<SpeciesProfile, ReferenceError>;
    fn load_fertilizer(&self, name: &str) -> Result<FertilizerType, ReferenceError>;
}

impl ReferenceSource for ReferenceCatalog {
    fn load_species(&self, name: &str) -> Result<SpeciesProfile, ReferenceError> {
        self.species(name)
            .cloned()
            .ok_or_else(|| ReferenceError::UnknownSpecies(name.to_string()))
    }

    fn load_fertilizer(&self, name: &str) -> Result<FertilizerType, ReferenceError> {
        self.fertilizer(name)
            .cloned()
            .ok_or_else(|| ReferenceError::UnknownFertilizer(name.to_string()))
    }
}
