use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    config::ModelTuning,
    diseases::{ConditionInputs, DiseaseKind, BROAD_SPECTRUM_SPRAY},
    engine::{StepContext, StepScratch, System},
    plant::PlantRecord,
    rng::RollSource,
    species::SpeciesProfile,
};

pub struct DiseaseSystem;

impl DiseaseSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DiseaseSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for DiseaseSystem {
    fn name(&self) -> &str {
        "disease"
    }

    fn run(&self, ctx: &StepContext<'_>, plant: &mut PlantRecord, scratch: &mut StepScratch) {
        let moisture = scratch.moisture;
        let inputs_at = |at: DateTime<Utc>| ConditionInputs {
            temperature: ctx.env.temperature,
            humidity: ctx.env.humidity,
            light: ctx.env.light,
            moisture: moisture.effective_at(secs_between(ctx.from, at)),
        };
        let before = plant.disease;
        scratch.disease_checks += run_due_checks(
            plant,
            ctx.species,
            inputs_at,
            ctx.to,
            ctx.tuning,
            ctx.rolls,
            ctx.max_disease_checks,
        );
        if before.is_none() {
            if let Some(kind) = plant.disease {
                scratch.onset = Some(kind);
            }
        }
    }
}

fn secs_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1_000.0
}

/// Runs every check that has come due since `last_disease_check`, one per
/// full check interval, each at its own scheduled instant and with the
/// conditions `inputs_at` reports for that instant. Returns how many checks
/// ran. Checks beyond `max_checks` are skipped but still consumed.
pub fn run_due_checks(
    plant: &mut PlantRecord,
    species: &SpeciesProfile,
    inputs_at: impl Fn(DateTime<Utc>) -> ConditionInputs,
    now: DateTime<Utc>,
    tuning: &ModelTuning,
    rolls: &dyn RollSource,
    max_checks: u32,
) -> u32 {
    let Some(last) = plant.last_disease_check else {
        plant.last_disease_check = Some(now);
        return 0;
    };
    let interval = tuning.disease_check_interval_secs.max(1);
    let elapsed = (now - last).num_seconds();
    if elapsed < interval {
        return 0;
    }
    let due = elapsed / interval;
    let runnable = due.min(max_checks as i64);
    for n in 1..=runnable {
        let checked_at = last + Duration::seconds(n * interval);
        let inputs = inputs_at(checked_at);
        check_once(plant, species, &inputs, checked_at, rolls);
    }
    plant.last_disease_check = Some(last + Duration::seconds(due * interval));
    runnable as u32
}

/// One eligible check: onset while healthy, progression while diseased.
pub fn check_once(
    plant: &mut PlantRecord,
    species: &SpeciesProfile,
    inputs: &ConditionInputs,
    checked_at: DateTime<Utc>,
    rolls: &dyn RollSource,
) {
    match plant.disease {
        None => {
            if let Some(kind) = evaluate_onset(plant, species, inputs, checked_at, rolls) {
                plant.disease = Some(kind);
                plant.disease_progress = 0.0;
                plant.disease_slowing = kind.rule().slowing_at(0.0);
                plant.shade_secs = 0.0;
                info!(plant = %plant.id, disease = kind.name(), "disease onset");
            }
        }
        Some(kind) => {
            let rule = kind.rule();
            if rule.sustain.holds(species, inputs) {
                plant.disease_progress =
                    (plant.disease_progress + species.disease_progression_rate).clamp(0.0, 1.0);
                plant.disease_slowing = rule.slowing_at(plant.disease_progress);
            }
        }
    }
}

/// First disease, in the species' priority order, whose trigger holds and
/// whose roll lands under its onset probability.
pub fn evaluate_onset(
    plant: &PlantRecord,
    species: &SpeciesProfile,
    inputs: &ConditionInputs,
    checked_at: DateTime<Utc>,
    rolls: &dyn RollSource,
) -> Option<DiseaseKind> {
    species
        .diseases
        .iter()
        .enumerate()
        .find_map(|(slot, kind)| {
            let rule = kind.rule();
            if !rule.trigger.holds(species, inputs) {
                return None;
            }
            let roll = rolls.roll(&plant.id, checked_at.timestamp(), slot);
            (roll < rule.onset_probability).then_some(*kind)
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CureOutcome {
    Cured,
    Reduced { progress: f64 },
    NoEffect,
    NotDiseased,
}

/// Applies a treatment item. An exact cure clears the disease; the
/// broad-spectrum spray knocks progress down and cures once it reaches zero.
pub fn apply_cure(plant: &mut PlantRecord, item: &str, tuning: &ModelTuning) -> CureOutcome {
    let Some(kind) = plant.disease else {
        return CureOutcome::NotDiseased;
    };
    let rule = kind.rule();
    if rule.is_exact_cure(item) {
        plant.clear_disease();
        info!(plant = %plant.id, disease = kind.name(), item, "disease cured");
        return CureOutcome::Cured;
    }
    if item.eq_ignore_ascii_case(BROAD_SPECTRUM_SPRAY) {
        let progress = (plant.disease_progress - tuning.partial_cure_decrement).max(0.0);
        if progress <= 0.0 {
            plant.clear_disease();
            info!(plant = %plant.id, disease = kind.name(), item, "disease cured");
            return CureOutcome::Cured;
        }
        plant.disease_progress = progress;
        plant.disease_slowing = rule.slowing_at(progress);
        debug!(plant = %plant.id, disease = kind.name(), progress, "disease reduced");
        return CureOutcome::Reduced { progress };
    }
    CureOutcome::NoEffect
}
