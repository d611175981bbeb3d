//! Disease rule table.
//!
//! Every disease is one row of plain data. Species pick an ordered subset of
//! rows and supply their own thresholds by name, so the state machine in
//! `systems::disease` is the same for every species.

use serde::{Deserialize, Serialize};

use crate::species::SpeciesProfile;

/// Treatment that reduces any disease by a fixed step instead of curing it.
pub const BROAD_SPECTRUM_SPRAY: &str = "broad_spectrum_spray";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiseaseKind {
    RootRot,
    PowderyMildew,
    LeafSpot,
    Blight,
    SpiderMites,
    Aphids,
    Sunscald,
    Chlorosis,
}

impl DiseaseKind {
    pub const ALL: [DiseaseKind; 8] = [
        DiseaseKind::RootRot,
        DiseaseKind::PowderyMildew,
        DiseaseKind::LeafSpot,
        DiseaseKind::Blight,
        DiseaseKind::SpiderMites,
        DiseaseKind::Aphids,
        DiseaseKind::Sunscald,
        DiseaseKind::Chlorosis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::RootRot => "RootRot",
            Self::PowderyMildew => "PowderyMildew",
            Self::LeafSpot => "LeafSpot",
            Self::Blight => "Blight",
            Self::SpiderMites => "SpiderMites",
            Self::Aphids => "Aphids",
            Self::Sunscald => "Sunscald",
            Self::Chlorosis => "Chlorosis",
        }
    }

    /// Accepts the stored name or its snake_case form. `None` and anything
    /// unrecognised yield `None`.
    pub fn from_name(raw: &str) -> Option<Self> {
        let wanted: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != ' ')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().to_ascii_lowercase() == wanted)
    }

    pub fn rule(self) -> &'static DiseaseRule {
        &RULES[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Humidity,
    Moisture,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Above,
    Below,
}

/// Effective conditions a disease predicate reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionInputs {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub moisture: f64,
}

impl ConditionInputs {
    fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Moisture => self.moisture,
            Metric::Light => self.light,
        }
    }
}

/// Threshold comparison against a named species threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold_key: &'static str,
    pub fallback: f64,
    /// Relaxes the threshold toward the safe side; used by sustaining checks.
    pub margin: f64,
}

impl Condition {
    const fn new(
        metric: Metric,
        comparison: Comparison,
        threshold_key: &'static str,
        fallback: f64,
    ) -> Self {
        Self {
            metric,
            comparison,
            threshold_key,
            fallback,
            margin: 0.0,
        }
    }

    const fn relaxed(self, margin: f64) -> Self {
        Self { margin, ..self }
    }

    pub fn threshold(&self, species: &SpeciesProfile) -> f64 {
        species
            .threshold(self.threshold_key)
            .unwrap_or(self.fallback)
    }

    pub fn holds(&self, species: &SpeciesProfile, inputs: &ConditionInputs) -> bool {
        let value = inputs.get(self.metric);
        if !value.is_finite() {
            return false;
        }
        let threshold = self.threshold(species);
        match self.comparison {
            Comparison::Above => value > threshold - self.margin,
            Comparison::Below => value < threshold + self.margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiseaseRule {
    pub kind: DiseaseKind,
    pub trigger: Condition,
    pub sustain: Condition,
    /// Chance per eligible check that a holding trigger starts the disease.
    pub onset_probability: f64,
    /// Growth multiplier at full progress.
    pub slowing_floor: f64,
    pub cures: &'static [&'static str],
}

impl DiseaseRule {
    pub fn slowing_at(&self, progress: f64) -> f64 {
        let t = progress.clamp(0.0, 1.0);
        1.0 + (self.slowing_floor - 1.0) * t
    }

    pub fn is_exact_cure(&self, item: &str) -> bool {
        self.cures.iter().any(|cure| cure.eq_ignore_ascii_case(item))
    }
}

use Comparison::{Above, Below};
use Metric::{Humidity, Light, Moisture, Temperature};

// Indexed by `DiseaseKind as usize`.
static RULES: [DiseaseRule; 8] = [
    DiseaseRule {
        kind: DiseaseKind::RootRot,
        trigger: Condition::new(Moisture, Above, "rootRotMoistureThreshold", 80.0),
        sustain: Condition::new(Moisture, Above, "rootRotMoistureThreshold", 80.0).relaxed(5.0),
        onset_probability: 0.3,
        slowing_floor: 0.5,
        cures: &["fungicide", "drainage_kit"],
    },
    DiseaseRule {
        kind: DiseaseKind::PowderyMildew,
        trigger: Condition::new(Humidity, Above, "mildewHumidityThreshold", 85.0),
        sustain: Condition::new(Humidity, Above, "mildewHumidityThreshold", 85.0).relaxed(5.0),
        onset_probability: 0.25,
        slowing_floor: 0.7,
        cures: &["sulfur_spray", "fungicide"],
    },
    DiseaseRule {
        kind: DiseaseKind::LeafSpot,
        trigger: Condition::new(Humidity, Above, "leafSpotHumidityThreshold", 80.0),
        sustain: Condition::new(Humidity, Above, "leafSpotHumidityThreshold", 80.0).relaxed(5.0),
        onset_probability: 0.2,
        slowing_floor: 0.8,
        cures: &["copper_spray"],
    },
    DiseaseRule {
        kind: DiseaseKind::Blight,
        trigger: Condition::new(Temperature, Above, "blightTemperatureThreshold", 27.0),
        sustain: Condition::new(Temperature, Above, "blightTemperatureThreshold", 27.0)
            .relaxed(2.0),
        onset_probability: 0.15,
        slowing_floor: 0.6,
        cures: &["copper_spray", "fungicide"],
    },
    DiseaseRule {
        kind: DiseaseKind::SpiderMites,
        trigger: Condition::new(Humidity, Below, "spiderMiteHumidityThreshold", 35.0),
        sustain: Condition::new(Humidity, Below, "spiderMiteHumidityThreshold", 35.0)
            .relaxed(5.0),
        onset_probability: 0.25,
        slowing_floor: 0.75,
        cures: &["miticide", "neem_oil"],
    },
    DiseaseRule {
        kind: DiseaseKind::Aphids,
        trigger: Condition::new(Moisture, Below, "aphidMoistureThreshold", 30.0),
        sustain: Condition::new(Moisture, Below, "aphidMoistureThreshold", 30.0).relaxed(5.0),
        onset_probability: 0.2,
        slowing_floor: 0.85,
        cures: &["neem_oil", "insecticidal_soap"],
    },
    DiseaseRule {
        kind: DiseaseKind::Sunscald,
        trigger: Condition::new(Light, Above, "sunscaldLightThreshold", 700.0),
        sustain: Condition::new(Light, Above, "sunscaldLightThreshold", 700.0).relaxed(50.0),
        onset_probability: 0.3,
        slowing_floor: 0.8,
        cures: &["shade_cloth"],
    },
    DiseaseRule {
        kind: DiseaseKind::Chlorosis,
        trigger: Condition::new(Light, Below, "chlorosisLightThreshold", 60.0),
        sustain: Condition::new(Light, Below, "chlorosisLightThreshold", 60.0).relaxed(10.0),
        onset_probability: 0.2,
        slowing_floor: 0.85,
        cures: &["iron_chelate"],
    },
];
