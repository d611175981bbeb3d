use tracing::info;

use crate::{
    config::ModelTuning,
    engine::{StepContext, StepScratch, System},
    plant::PlantRecord,
};

pub struct ShadeSystem;

impl ShadeSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShadeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ShadeSystem {
    fn name(&self) -> &str {
        "shade"
    }

    fn run(&self, ctx: &StepContext<'_>, plant: &mut PlantRecord, scratch: &mut StepScratch) {
        if update_shade(plant, ctx.elapsed_secs, ctx.tuning) {
            scratch.shade_cured = true;
        }
    }
}

/// Advances the shade counter for a diseased ground plant under shade.
/// Returns true when the counter reached the cure duration this call.
pub fn update_shade(plant: &mut PlantRecord, elapsed_secs: f64, tuning: &ModelTuning) -> bool {
    if !plant.location.is_ground() {
        return false;
    }
    if !plant.shade_active || !plant.is_diseased() {
        plant.shade_secs = 0.0;
        return false;
    }
    if elapsed_secs <= 0.0 {
        return false;
    }
    plant.shade_secs += elapsed_secs;
    if plant.shade_secs >= tuning.shade_cure_secs {
        let disease = plant.disease.map(|d| d.name()).unwrap_or("None");
        plant.clear_disease();
        info!(plant = %plant.id, disease, "shade cured disease");
        return true;
    }
    false
}

/// Raises or removes a shade structure. Only ground plants can be shaded.
pub fn set_shade(plant: &mut PlantRecord, active: bool) -> bool {
    if !plant.location.is_ground() {
        return false;
    }
    plant.shade_active = active;
    if !active {
        plant.shade_secs = 0.0;
    }
    true
}
