use crate::{
    config::ModelTuning,
    engine::{StepContext, StepScratch, System},
    plant::{LocationCategory, PlantRecord, MOISTURE_MAX},
    species::Range,
};

pub struct MoistureSystem;

impl MoistureSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MoistureSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for MoistureSystem {
    fn name(&self) -> &str {
        "moisture"
    }

    fn run(&self, ctx: &StepContext<'_>, plant: &mut PlantRecord, scratch: &mut StepScratch) {
        let ranges = ctx.species.ranges_for(plant.location);
        scratch.moisture = MoistureTrajectory {
            start: plant.moisture,
            loss_per_sec: evaporation_per_sec(
                ctx.env.humidity,
                ranges.humidity.min,
                plant.location,
                ctx.tuning,
            ),
            bonus: humidity_bonus(ctx.env.humidity, ranges.humidity, ctx.tuning),
        };
        plant.moisture = reduce_moisture_based_on_humidity(
            plant.moisture,
            ctx.env.humidity,
            ranges.humidity.min,
            plant.location,
            ctx.elapsed_secs,
            ctx.tuning,
        );
    }
}

/// Stored moisture over one step. It falls at `loss_per_sec` from `start`
/// until it reaches zero; `bonus` is the humidity share added when scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoistureTrajectory {
    pub start: f64,
    pub loss_per_sec: f64,
    pub bonus: f64,
}

impl MoistureTrajectory {
    pub fn constant(moisture: f64, bonus: f64) -> Self {
        Self {
            start: moisture,
            loss_per_sec: 0.0,
            bonus,
        }
    }

    /// Stored moisture `secs` into the step.
    pub fn at(&self, secs: f64) -> f64 {
        (self.start - self.loss_per_sec * secs.max(0.0)).max(0.0)
    }

    /// Effective moisture `secs` into the step.
    pub fn effective_at(&self, secs: f64) -> f64 {
        (self.at(secs) + self.bonus).clamp(0.0, MOISTURE_MAX)
    }

    /// Integral of `score(effective moisture)` over `[from, to]` seconds.
    /// Exact when `score` is linear between consecutive `knots`: the
    /// interval is cut wherever effective moisture crosses a knot, bottoms
    /// out or hits the ceiling, and each linear piece is a trapezoid.
    pub fn integrate(
        &self,
        from: f64,
        to: f64,
        knots: &[f64],
        score: impl Fn(f64) -> f64,
    ) -> f64 {
        if from.is_nan() || to.is_nan() || to <= from {
            return 0.0;
        }
        let mut cuts = vec![from, to];
        if self.loss_per_sec > 0.0 {
            let crossings = knots
                .iter()
                .copied()
                .chain([0.0, MOISTURE_MAX])
                .map(|value| (self.start + self.bonus - value) / self.loss_per_sec)
                .chain([self.start / self.loss_per_sec]);
            cuts.extend(crossings.filter(|t| *t > from && *t < to));
        }
        cuts.sort_by(f64::total_cmp);
        cuts.windows(2)
            .map(|w| {
                let (a, b) = (w[0], w[1]);
                0.5 * (b - a) * (score(self.effective_at(a)) + score(self.effective_at(b)))
            })
            .sum()
    }
}

/// Evaporation per second. Zero while humidity is at or above the species
/// minimum.
pub fn evaporation_per_sec(
    humidity: f64,
    min_humidity: f64,
    location: LocationCategory,
    tuning: &ModelTuning,
) -> f64 {
    if humidity.is_nan() || humidity >= min_humidity || min_humidity <= 0.0 {
        return 0.0;
    }
    let deficit_ratio = ((min_humidity - humidity) / min_humidity).clamp(0.0, 1.0);
    let location_factor = if location.is_greenhouse() {
        tuning.greenhouse_evaporation_factor
    } else {
        1.0
    };
    deficit_ratio * tuning.evaporation_rate * location_factor
}

/// Moisture after `elapsed_secs` of evaporation. No loss while humidity is at
/// or above the species minimum.
pub fn reduce_moisture_based_on_humidity(
    moisture: f64,
    humidity: f64,
    min_humidity: f64,
    location: LocationCategory,
    elapsed_secs: f64,
    tuning: &ModelTuning,
) -> f64 {
    if elapsed_secs <= 0.0 {
        return moisture;
    }
    let loss = evaporation_per_sec(humidity, min_humidity, location, tuning) * elapsed_secs;
    (moisture - loss).max(0.0)
}

/// Share of effective moisture that ambient humidity contributes. Scoring
/// only; never written back to the record.
pub fn humidity_bonus(humidity: f64, humidity_range: Range, tuning: &ModelTuning) -> f64 {
    humidity_range.inverse_lerp(humidity) * tuning.humidity_moisture_bonus
}

/// External watering event.
pub fn add_moisture(plant: &mut PlantRecord, amount: f64) {
    if !amount.is_finite() || amount <= 0.0 {
        return;
    }
    plant.moisture = (plant.moisture + amount).clamp(0.0, MOISTURE_MAX);
}
