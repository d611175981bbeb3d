//! Plant simulation pipeline
//!
//! A [`Simulator`] owns an ordered list of [`System`]s and advances one plant
//! record over a span of time. The session tick and the catch-up pass both go
//! through [`Simulator::advance`], so a plant evolves the same way no matter
//! which driver moved it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    config::{CatchUpMode, ModelTuning},
    diseases::DiseaseKind,
    plant::PlantRecord,
    rng::{RollSource, SeededRolls},
    species::SpeciesProfile,
    systems::{
        environment::{self, EnvironmentSample},
        moisture::{humidity_bonus, MoistureTrajectory},
        DiseaseSystem, FertilizerSystem, GrowthSystem, MoistureSystem, ShadeSystem,
    },
    weather::{AmbientSample, WeatherSeries},
};

/// Read-only inputs shared by every system for one step.
pub struct StepContext<'a> {
    pub species: &'a SpeciesProfile,
    pub tuning: &'a ModelTuning,
    pub env: EnvironmentSample,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub rolls: &'a dyn RollSource,
    pub max_disease_checks: u32,
}

/// Values one system hands to the next within a single step. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct StepScratch {
    /// Set by the moisture step; growth and disease read moisture along it.
    pub moisture: MoistureTrajectory,
    pub fertilizer_active_secs: f64,
    pub fertilizer_boost: f64,
    pub disease_checks: u32,
    pub onset: Option<DiseaseKind>,
    pub shade_cured: bool,
}

pub trait System: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, ctx: &StepContext<'_>, plant: &mut PlantRecord, scratch: &mut StepScratch);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub elapsed_secs: f64,
    pub scale_delta: f64,
    pub reached_max_scale: bool,
    pub disease_checks: u32,
    pub onset: Option<DiseaseKind>,
    pub shade_cured: bool,
    /// True when the record had no growth timestamp and this call only
    /// stamped it.
    pub first_observation: bool,
}

impl StepReport {
    fn absorb(&mut self, other: StepReport) {
        self.elapsed_secs += other.elapsed_secs;
        self.scale_delta += other.scale_delta;
        self.reached_max_scale |= other.reached_max_scale;
        self.disease_checks += other.disease_checks;
        self.onset = self.onset.or(other.onset);
        self.shade_cured |= other.shade_cured;
        self.first_observation |= other.first_observation;
    }
}

pub struct SimulatorBuilder {
    tuning: ModelTuning,
    rolls: Arc<dyn RollSource>,
    max_disease_checks: u32,
    systems: Vec<Box<dyn System>>,
}

impl SimulatorBuilder {
    pub fn new(tuning: ModelTuning) -> Self {
        Self {
            tuning,
            rolls: Arc::new(SeededRolls::default()),
            max_disease_checks: u32::MAX,
            systems: Vec::new(),
        }
    }

    pub fn with_rolls(mut self, rolls: Arc<dyn RollSource>) -> Self {
        self.rolls = rolls;
        self
    }

    pub fn with_max_disease_checks(mut self, max: u32) -> Self {
        self.max_disease_checks = max;
        self
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Moisture, fertilizer, growth, disease, shade. Growth reads the
    /// fertilizer step's active time, so the order matters.
    pub fn with_standard_pipeline(self) -> Self {
        self.with_system(MoistureSystem::new())
            .with_system(FertilizerSystem::new())
            .with_system(GrowthSystem::new())
            .with_system(DiseaseSystem::new())
            .with_system(ShadeSystem::new())
    }

    pub fn build(self) -> Simulator {
        Simulator {
            tuning: self.tuning,
            rolls: self.rolls,
            max_disease_checks: self.max_disease_checks,
            systems: self.systems,
        }
    }
}

pub struct Simulator {
    tuning: ModelTuning,
    rolls: Arc<dyn RollSource>,
    max_disease_checks: u32,
    systems: Vec<Box<dyn System>>,
}

impl Simulator {
    pub fn standard(tuning: ModelTuning, rolls: Arc<dyn RollSource>) -> Self {
        SimulatorBuilder::new(tuning)
            .with_rolls(rolls)
            .with_standard_pipeline()
            .build()
    }

    pub fn tuning(&self) -> &ModelTuning {
        &self.tuning
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    /// Moves `plant` from its last growth timestamp to `to` under a single
    /// ambient sample. A record without a timestamp is stamped and left
    /// otherwise untouched; a timestamp in the future counts as zero elapsed.
    pub fn advance(
        &self,
        plant: &mut PlantRecord,
        species: &SpeciesProfile,
        ambient: &AmbientSample,
        to: DateTime<Utc>,
    ) -> StepReport {
        let Some(from) = plant.last_growth_update else {
            plant.last_growth_update = Some(to);
            if plant.last_disease_check.is_none() {
                plant.last_disease_check = Some(to);
            }
            plant.normalize();
            return StepReport {
                first_observation: true,
                ..StepReport::default()
            };
        };

        let elapsed_secs = ((to - from).num_milliseconds() as f64 / 1_000.0).max(0.0);
        let env = environment::sample(ambient, plant.location, &self.tuning);
        let ctx = StepContext {
            species,
            tuning: &self.tuning,
            env,
            from,
            to,
            elapsed_secs,
            rolls: self.rolls.as_ref(),
            max_disease_checks: self.max_disease_checks,
        };

        let ranges = species.ranges_for(plant.location);
        let mut scratch = StepScratch {
            moisture: MoistureTrajectory::constant(
                plant.moisture,
                humidity_bonus(env.humidity, ranges.humidity, &self.tuning),
            ),
            fertilizer_boost: 1.0,
            ..StepScratch::default()
        };

        let scale_before = plant.scale;
        let capped_before = plant.reached_max_scale;
        for system in &self.systems {
            system.run(&ctx, plant, &mut scratch);
            trace!(plant = %plant.id, system = system.name(), "system ran");
        }

        plant.last_growth_update = Some(from.max(to));
        plant.normalize();

        StepReport {
            elapsed_secs,
            scale_delta: plant.scale - scale_before,
            reached_max_scale: plant.reached_max_scale && !capped_before,
            disease_checks: scratch.disease_checks,
            onset: scratch.onset,
            shade_cured: scratch.shade_cured,
            first_observation: false,
        }
    }

    /// Brings an offline plant up to `to` from the user's weather series.
    /// Returns `None` when the series has nothing to sample.
    pub fn catch_up(
        &self,
        plant: &mut PlantRecord,
        species: &SpeciesProfile,
        series: &WeatherSeries,
        to: DateTime<Utc>,
        mode: CatchUpMode,
    ) -> Option<StepReport> {
        let current = series.hour_at(to)?.ambient();
        let from = match (mode, plant.last_growth_update) {
            (CatchUpMode::Hourly, Some(from)) if from < to => from,
            _ => return Some(self.advance(plant, species, &current, to)),
        };

        let mut report = StepReport::default();
        for segment in series.segments(from, to) {
            let step = self.advance(plant, species, &segment.hour.ambient(), segment.to);
            report.absorb(step);
        }
        Some(report)
    }
}
