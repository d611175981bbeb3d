use tracing::debug;

use crate::{
    config::ModelTuning,
    engine::{StepContext, StepScratch, System},
    plant::{PlantRecord, NUTRIENT_MAX},
    species::{FertilizerType, SpeciesProfile},
    systems::environment::EnvironmentSample,
};

pub struct FertilizerSystem;

impl FertilizerSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FertilizerSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for FertilizerSystem {
    fn name(&self) -> &str {
        "fertilizer"
    }

    fn run(&self, ctx: &StepContext<'_>, plant: &mut PlantRecord, scratch: &mut StepScratch) {
        scratch.fertilizer_boost = get_fertilizer_boost(plant);
        scratch.fertilizer_active_secs =
            update_fertilizer(plant, ctx.species, &ctx.env, ctx.elapsed_secs, ctx.tuning);
    }
}

/// Boost a fertilizer grants a species, with the mismatch penalty applied
/// when categories differ.
pub fn boost_for(
    species: &SpeciesProfile,
    fertilizer: &FertilizerType,
    tuning: &ModelTuning,
) -> f64 {
    if fertilizer.category == species.preferred_fertilizer {
        species.fertilizer_boost
    } else {
        species.fertilizer_boost * tuning.fertilizer_mismatch_penalty
    }
}

pub fn apply_fertilizer(
    plant: &mut PlantRecord,
    species: &SpeciesProfile,
    fertilizer: &FertilizerType,
    tuning: &ModelTuning,
) {
    plant.nutrient = (plant.nutrient + fertilizer.base_nutrient).clamp(0.0, NUTRIENT_MAX);
    plant.fertilizer_remaining_secs = (fertilizer.duration_hours * 3_600.0).max(0.0);
    plant.fertilizer = Some(fertilizer.name.clone());
    plant.fertilizer_boost = usable_boost(boost_for(species, fertilizer, tuning));
    debug!(
        plant = %plant.id,
        fertilizer = %fertilizer.name,
        boost = plant.fertilizer_boost,
        "fertilizer applied"
    );
}

/// Nutrient lost per second under the given conditions.
pub fn depletion_per_sec(
    species: &SpeciesProfile,
    env: &EnvironmentSample,
    greenhouse: bool,
    tuning: &ModelTuning,
) -> f64 {
    let light_scale = (1.0
        + tuning.light_depletion_slope * (env.light - tuning.reference_light)
            / tuning.reference_light)
        .clamp(0.25, 2.0);
    let location_factor = if greenhouse {
        tuning.greenhouse_depletion_factor
    } else {
        1.0
    };
    let rain_factor = if env.is_raining() {
        tuning.rain_depletion_factor
    } else {
        1.0
    };
    (species.nutrient_depletion_rate / 3_600.0) * light_scale * location_factor * rain_factor
}

/// Depletes nutrient and remaining duration. Returns how many of the elapsed
/// seconds the fertilizer was still active, which weights the growth boost.
pub fn update_fertilizer(
    plant: &mut PlantRecord,
    species: &SpeciesProfile,
    env: &EnvironmentSample,
    elapsed_secs: f64,
    tuning: &ModelTuning,
) -> f64 {
    if !plant.fertilizer_active() {
        plant.clear_fertilizer();
        return 0.0;
    }
    if elapsed_secs <= 0.0 {
        return 0.0;
    }

    let rate = depletion_per_sec(species, env, plant.location.is_greenhouse(), tuning);
    let until_empty = if rate > 0.0 {
        plant.nutrient / rate
    } else {
        f64::INFINITY
    };
    let active_secs = elapsed_secs
        .min(plant.fertilizer_remaining_secs)
        .min(until_empty);

    plant.nutrient = (plant.nutrient - rate * elapsed_secs).max(0.0);
    plant.fertilizer_remaining_secs = (plant.fertilizer_remaining_secs - elapsed_secs).max(0.0);
    if !plant.fertilizer_active() {
        plant.clear_fertilizer();
    }
    active_secs
}

/// Growth multiplier while fertilized, 1.0 otherwise. A penalized boost
/// may fall below 1.0.
pub fn get_fertilizer_boost(plant: &PlantRecord) -> f64 {
    if plant.fertilizer_active() {
        usable_boost(plant.fertilizer_boost)
    } else {
        1.0
    }
}

/// Non-finite or negative multipliers fall back to no boost.
pub fn usable_boost(boost: f64) -> f64 {
    if boost.is_finite() && boost >= 0.0 {
        boost
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::{LocationCategory, Position};
    use crate::species::fixtures;

    fn plant(location: LocationCategory) -> PlantRecord {
        PlantRecord::new(
            "p1",
            "u1",
            "fern",
            location,
            Position::default(),
            0.1,
            chrono::Utc::now(),
        )
    }

    fn env(light: f64, precipitation: f64) -> EnvironmentSample {
        EnvironmentSample {
            temperature: 20.0,
            humidity: 60.0,
            light,
            precipitation,
        }
    }

    #[test]
    fn matching_category_gets_full_boost() {
        let tuning = ModelTuning::default();
        let fern = fixtures::fern();
        let mut p = plant(LocationCategory::Ground);
        apply_fertilizer(&mut p, &fern, &fixtures::nitrogen_feed(), &tuning);
        assert_eq!(p.fertilizer_boost, 1.5);
        assert_eq!(p.nutrient, 40.0);
        assert_eq!(p.fertilizer_remaining_secs, 48.0 * 3_600.0);
        assert_eq!(get_fertilizer_boost(&p), 1.5);
    }

    #[test]
    fn penalized_boost_can_drop_below_one() {
        let tuning = ModelTuning::default();
        let mut fern = fixtures::fern();
        fern.fertilizer_boost = 1.1;
        let mut p = plant(LocationCategory::Ground);
        apply_fertilizer(&mut p, &fern, &fixtures::bone_meal(), &tuning);
        assert!((get_fertilizer_boost(&p) - 0.88).abs() < 1e-12);

        p.fertilizer_boost = f64::NAN;
        assert_eq!(get_fertilizer_boost(&p), 1.0);
        p.fertilizer_boost = -0.5;
        assert_eq!(get_fertilizer_boost(&p), 1.0);
    }

    #[test]
    fn nutrient_is_capped_on_reapply() {
        let tuning = ModelTuning::default();
        let fern = fixtures::fern();
        let mut p = plant(LocationCategory::Ground);
        for _ in 0..4 {
            apply_fertilizer(&mut p, &fern, &fixtures::nitrogen_feed(), &tuning);
        }
        assert_eq!(p.nutrient, 100.0);
    }

    #[test]
    fn depletion_follows_light_greenhouse_and_rain() {
        let tuning = ModelTuning::default();
        let fern = fixtures::fern();
        let nominal = depletion_per_sec(&fern, &env(400.0, 0.0), false, &tuning);
        assert!((nominal - 2.0 / 3_600.0).abs() < 1e-12);
        let bright = depletion_per_sec(&fern, &env(800.0, 0.0), false, &tuning);
        assert!((bright / nominal - 1.5).abs() < 1e-9);
        let sheltered = depletion_per_sec(&fern, &env(400.0, 0.0), true, &tuning);
        assert!((sheltered / nominal - 0.5).abs() < 1e-9);
        let wet = depletion_per_sec(&fern, &env(400.0, 1.0), false, &tuning);
        assert!((wet / nominal - 1.2).abs() < 1e-9);
    }

    #[test]
    fn active_seconds_stop_at_expiry() {
        let tuning = ModelTuning::default();
        let fern = fixtures::fern();
        let mut p = plant(LocationCategory::Ground);
        apply_fertilizer(&mut p, &fern, &fixtures::nitrogen_feed(), &tuning);
        p.fertilizer_remaining_secs = 600.0;
        let active = update_fertilizer(&mut p, &fern, &env(400.0, 0.0), 3_600.0, &tuning);
        assert_eq!(active, 600.0);
        assert_eq!(p.fertilizer, None);
        assert_eq!(p.nutrient, 0.0);
        assert_eq!(get_fertilizer_boost(&p), 1.0);
    }

    #[test]
    fn inactive_record_is_reset() {
        let tuning = ModelTuning::default();
        let fern = fixtures::fern();
        let mut p = plant(LocationCategory::Ground);
        p.nutrient = 12.0;
        p.fertilizer = Some("green_grow".into());
        p.fertilizer_remaining_secs = 0.0;
        let active = update_fertilizer(&mut p, &fern, &env(400.0, 0.0), 10.0, &tuning);
        assert_eq!(active, 0.0);
        assert_eq!(p.nutrient, 0.0);
        assert_eq!(p.fertilizer, None);
    }
}
