//! Player-facing operations on a single plant record, plus the display
//! readout. None of these advance time; the caller brings the record up to
//! date first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    cache::ReferenceCache,
    config::ModelTuning,
    error::ActionError,
    plant::{LocationCategory, PlantRecord, Position},
    species::{FertilizerType, SpeciesProfile},
    systems::{disease, fertilizer, moisture, shade, CureOutcome},
};

/// Fresh record for a seed just planted.
pub fn plant_created(
    id: impl Into<String>,
    owner: impl Into<String>,
    species: &SpeciesProfile,
    location: LocationCategory,
    position: Position,
    now: DateTime<Utc>,
) -> PlantRecord {
    let record = PlantRecord::new(
        id,
        owner,
        species.name.clone(),
        location,
        position,
        species.initial_scale,
        now,
    );
    info!(plant = %record.id, owner = %record.owner, species = %species.name, "plant created");
    record
}

/// Replaces the plant in the same slot with a new seedling. This is the only
/// way the full-size flag is ever cleared.
pub fn replant(plant: &PlantRecord, species: &SpeciesProfile, now: DateTime<Utc>) -> PlantRecord {
    plant_created(
        plant.id.clone(),
        plant.owner.clone(),
        species,
        plant.location,
        plant.position,
        now,
    )
}

pub fn apply_fertilizer(
    plant: &mut PlantRecord,
    species: &SpeciesProfile,
    fertilizer_type: &FertilizerType,
    tuning: &ModelTuning,
) {
    fertilizer::apply_fertilizer(plant, species, fertilizer_type, tuning);
}

pub fn apply_cure(plant: &mut PlantRecord, item: &str, tuning: &ModelTuning) -> CureOutcome {
    disease::apply_cure(plant, item, tuning)
}

/// Waters the plant. `None` uses the standard watering can increment.
pub fn add_moisture(plant: &mut PlantRecord, amount: Option<f64>, tuning: &ModelTuning) {
    moisture::add_moisture(plant, amount.unwrap_or(tuning.watering_increment));
}

pub fn set_shade(plant: &mut PlantRecord, active: bool) -> bool {
    shade::set_shade(plant, active)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlantAction {
    Water {
        #[serde(default)]
        amount: Option<f64>,
    },
    Fertilize {
        fertilizer: String,
    },
    Cure {
        item: String,
    },
    Shade {
        active: bool,
    },
    Replant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Watered { moisture: f64 },
    Fertilized { boost: f64 },
    Cure(CureOutcome),
    Shade { applied: bool },
    Replanted,
}

/// Runs one action against a record, resolving reference data through the
/// cache.
pub fn perform(
    plant: &mut PlantRecord,
    action: &PlantAction,
    cache: &ReferenceCache,
    tuning: &ModelTuning,
    now: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    let outcome = match action {
        PlantAction::Water { amount } => {
            add_moisture(plant, *amount, tuning);
            ActionOutcome::Watered {
                moisture: plant.moisture,
            }
        }
        PlantAction::Fertilize { fertilizer } => {
            let species = cache.species(&plant.species)?;
            let fertilizer_type = cache.fertilizer(fertilizer)?;
            apply_fertilizer(plant, &species, &fertilizer_type, tuning);
            ActionOutcome::Fertilized {
                boost: plant.fertilizer_boost,
            }
        }
        PlantAction::Cure { item } => ActionOutcome::Cure(apply_cure(plant, item, tuning)),
        PlantAction::Shade { active } => ActionOutcome::Shade {
            applied: set_shade(plant, *active),
        },
        PlantAction::Replant => {
            let species = cache.species(&plant.species)?;
            *plant = replant(plant, &species, now);
            ActionOutcome::Replanted
        }
    };
    Ok(outcome)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Healthy,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn of(plant: &PlantRecord) -> Self {
        if !plant.is_diseased() {
            return Self::Healthy;
        }
        match plant.disease_progress {
            p if p < 0.34 => Self::Mild,
            p if p < 0.67 => Self::Moderate,
            _ => Self::Severe,
        }
    }
}

/// What the UI shows for one plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantReadout {
    pub id: String,
    pub species: String,
    pub location: LocationCategory,
    pub moisture: f64,
    pub nutrient: f64,
    pub disease: String,
    pub disease_progress: f64,
    pub severity: Severity,
    pub scale: f64,
    /// Share of the species maximum, 0 to 100. Absent when the species is
    /// not known.
    pub growth_percent: Option<f64>,
    pub reached_max_scale: bool,
    pub fertilizer: Option<String>,
    pub fertilizer_hours_left: f64,
    pub shade_active: bool,
}

pub fn readout(plant: &PlantRecord, species: Option<&SpeciesProfile>) -> PlantReadout {
    PlantReadout {
        id: plant.id.clone(),
        species: plant.species.clone(),
        location: plant.location,
        moisture: plant.moisture,
        nutrient: plant.nutrient,
        disease: plant
            .disease
            .map(|d| d.name().to_string())
            .unwrap_or_else(|| "None".to_string()),
        disease_progress: plant.disease_progress,
        severity: Severity::of(plant),
        scale: plant.scale,
        growth_percent: species
            .filter(|s| s.max_scale > 0.0)
            .map(|s| (plant.scale / s.max_scale * 100.0).clamp(0.0, 100.0)),
        reached_max_scale: plant.reached_max_scale,
        fertilizer: plant.fertilizer.clone(),
        fertilizer_hours_left: if plant.fertilizer_active() {
            plant.fertilizer_remaining_secs / 3_600.0
        } else {
            0.0
        },
        shade_active: plant.shade_active,
    }
}
