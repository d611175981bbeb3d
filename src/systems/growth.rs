use tracing::info;

use crate::{
    engine::{StepContext, StepScratch, System},
    plant::PlantRecord,
    species::{Range, SpeciesProfile},
    systems::{environment::EnvironmentSample, moisture::MoistureTrajectory},
};

pub struct GrowthSystem;

impl GrowthSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrowthSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for GrowthSystem {
    fn name(&self) -> &str {
        "growth"
    }

    fn run(&self, ctx: &StepContext<'_>, plant: &mut PlantRecord, scratch: &mut StepScratch) {
        if ctx.elapsed_secs <= 0.0 || plant.reached_max_scale {
            return;
        }
        let elapsed = ctx.elapsed_secs;
        // The fertilizer is active from the start of the step for
        // `fertilizer_active_secs`, so its boost only scales that leading
        // part of the modifier integral.
        let fertilized = scratch.fertilizer_active_secs.clamp(0.0, elapsed);
        let whole = modifier_secs(ctx.species, plant, &ctx.env, &scratch.moisture, elapsed);
        let boosted = if fertilized > 0.0 {
            modifier_secs(ctx.species, plant, &ctx.env, &scratch.moisture, fertilized)
        } else {
            0.0
        };
        let weighted = whole + (scratch.fertilizer_boost - 1.0) * boosted;

        let increment = scale_increment(ctx.species, weighted, plant.disease_slowing);
        if apply_growth(plant, ctx.species, increment) {
            info!(plant = %plant.id, species = %ctx.species.name, "plant reached full size");
        }
    }
}

/// Score in [0, 1] for how well `value` sits in `range`: 1 at the midpoint,
/// 0.5 at either edge, then tapering to 0 one range-width outside.
pub fn suitability(value: f64, range: Range) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let width = (range.max - range.min).max(1e-6);
    let position = (value - range.min) / width;
    if (0.0..=1.0).contains(&position) {
        1.0 - 0.5 * (2.0 * position - 1.0).abs()
    } else {
        let overshoot = if position < 0.0 {
            -position
        } else {
            position - 1.0
        };
        (0.5 * (1.0 - overshoot)).max(0.0)
    }
}

/// Breakpoints of [`suitability`] for `range`; the score is linear between
/// consecutive knots.
pub fn suitability_knots(range: Range) -> [f64; 5] {
    let width = (range.max - range.min).max(1e-6);
    [
        range.min - width,
        range.min,
        range.midpoint(),
        range.max,
        range.max + width,
    ]
}

/// Weighted suitability of temperature, humidity and light. Constant over a
/// step, since the sample is.
pub fn climate_score(
    species: &SpeciesProfile,
    plant: &PlantRecord,
    env: &EnvironmentSample,
) -> f64 {
    let ranges = species.ranges_for(plant.location);
    let weights = species.weights.normalized();
    weights.temperature * suitability(env.temperature, ranges.temperature)
        + weights.humidity * suitability(env.humidity, ranges.humidity)
        + weights.light * suitability(env.light, ranges.light)
}

/// Growth modifier integrated over the first `span` seconds of a step, with
/// moisture scored along its trajectory.
pub fn modifier_secs(
    species: &SpeciesProfile,
    plant: &PlantRecord,
    env: &EnvironmentSample,
    moisture: &MoistureTrajectory,
    span: f64,
) -> f64 {
    if span.is_nan() || span <= 0.0 {
        return 0.0;
    }
    let weights = species.weights.normalized();
    let band = species.moisture_band();
    let soil = moisture.integrate(0.0, span, &suitability_knots(band), |m| {
        suitability(m, band)
    });
    climate_score(species, plant, env) * span + weights.moisture * soil
}

/// Base rate times disease slowing times modifier-seconds.
pub fn scale_increment(species: &SpeciesProfile, modifier_secs: f64, slowing: f64) -> f64 {
    let increment = species.base_growth_rate * modifier_secs * slowing;
    if increment.is_finite() {
        increment.max(0.0)
    } else {
        0.0
    }
}

/// Adds `increment`, capping at the species maximum. Returns true when this
/// call set the capped flag.
pub fn apply_growth(plant: &mut PlantRecord, species: &SpeciesProfile, increment: f64) -> bool {
    if plant.reached_max_scale {
        return false;
    }
    let next = plant.scale + increment;
    if next >= species.max_scale {
        plant.scale = species.max_scale;
        plant.reached_max_scale = true;
        true
    } else {
        plant.scale = next;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::{LocationCategory, Position};
    use crate::species::fixtures;

    fn plant() -> PlantRecord {
        PlantRecord::new(
            "p1",
            "u1",
            "fern",
            LocationCategory::Ground,
            Position::default(),
            0.1,
            chrono::Utc::now(),
        )
    }

    #[test]
    fn suitability_peaks_at_midpoint_and_tapers_outside() {
        let range = Range::new(10.0, 20.0);
        assert_eq!(suitability(15.0, range), 1.0);
        assert_eq!(suitability(10.0, range), 0.5);
        assert_eq!(suitability(20.0, range), 0.5);
        assert!((suitability(25.0, range) - 0.25).abs() < 1e-9);
        assert_eq!(suitability(40.0, range), 0.0);
        assert!(suitability(9.9, range) < 0.5 && suitability(9.9, range) > 0.45);
    }

    fn ideal() -> EnvironmentSample {
        EnvironmentSample {
            temperature: 20.0,
            humidity: 70.0,
            light: 250.0,
            precipitation: 0.0,
        }
    }

    #[test]
    fn ideal_conditions_give_full_modifier() {
        let fern = fixtures::fern();
        let steady = MoistureTrajectory::constant(60.0, 0.0);
        let secs = modifier_secs(&fern, &plant(), &ideal(), &steady, 100.0);
        assert!((secs - 100.0).abs() < 1e-9);
    }

    #[test]
    fn drying_soil_is_scored_along_the_way() {
        let fern = fixtures::fern();
        // from the optimum down to the band edge and beyond over the span
        let drying = MoistureTrajectory {
            start: 60.0,
            loss_per_sec: 0.01,
            bonus: 0.0,
        };
        let band = fern.moisture_band();
        let knots = suitability_knots(band);
        let span = 3_000.0;
        let one = modifier_secs(&fern, &plant(), &ideal(), &drying, span);
        let climate = climate_score(&fern, &plant(), &ideal());
        let soil = drying.integrate(0.0, span, &knots, |m| suitability(m, band));
        let expected = climate * span + fern.weights.normalized().moisture * soil;
        assert!((one - expected).abs() < 1e-9);
        // strictly between scoring at the start and at the end
        let wet = MoistureTrajectory::constant(60.0, 0.0);
        let dry = MoistureTrajectory::constant(30.0, 0.0);
        let at_start = modifier_secs(&fern, &plant(), &ideal(), &wet, span);
        let at_end = modifier_secs(&fern, &plant(), &ideal(), &dry, span);
        assert!(one < at_start && one > at_end);
    }

    #[test]
    fn knots_bracket_the_band() {
        let knots = suitability_knots(Range::new(10.0, 20.0));
        assert_eq!(knots, [0.0, 10.0, 15.0, 20.0, 30.0]);
    }

    #[test]
    fn increment_multiplies_all_factors() {
        let fern = fixtures::fern();
        let inc = scale_increment(&fern, 75.0, 0.8);
        assert!((inc - 0.0001 * 75.0 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn growth_caps_and_stays_capped() {
        let fern = fixtures::fern();
        let mut p = plant();
        assert!(apply_growth(&mut p, &fern, 5.0));
        assert_eq!(p.scale, 1.0);
        assert!(p.reached_max_scale);
        assert!(!apply_growth(&mut p, &fern, 5.0));
        assert_eq!(p.scale, 1.0);
    }
}
