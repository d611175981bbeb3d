use serde::{Deserialize, Serialize};

use crate::{config::ModelTuning, plant::LocationCategory, weather::AmbientSample};

/// Conditions as a plant at a given location experiences them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSample {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub precipitation: f64,
}

impl EnvironmentSample {
    pub fn is_raining(&self) -> bool {
        self.precipitation > 0.0
    }
}

/// Applies location damping to an ambient sample. Pure: the session tick and
/// the catch-up pass call this with the same inputs and get the same result.
pub fn sample(
    ambient: &AmbientSample,
    location: LocationCategory,
    tuning: &ModelTuning,
) -> EnvironmentSample {
    let raw = EnvironmentSample {
        temperature: ambient.temperature,
        humidity: ambient.humidity,
        light: ambient.light,
        precipitation: ambient.precipitation,
    };
    let damped = match location {
        LocationCategory::Ground | LocationCategory::Unknown => raw,
        LocationCategory::Indoor => EnvironmentSample {
            temperature: pull_toward(
                raw.temperature,
                tuning.indoor_comfort_temperature,
                tuning.indoor_temperature_damping,
            ),
            humidity: pull_toward(
                raw.humidity,
                tuning.indoor_comfort_humidity,
                tuning.indoor_humidity_damping,
            ),
            light: raw.light * tuning.indoor_light_factor,
            precipitation: 0.0,
        },
        LocationCategory::Greenhouse => EnvironmentSample {
            temperature: raw.temperature + tuning.greenhouse_temperature_offset,
            humidity: pull_toward(
                raw.humidity,
                tuning.greenhouse_comfort_humidity,
                tuning.greenhouse_humidity_damping,
            ),
            light: raw.light * tuning.greenhouse_light_factor,
            precipitation: 0.0,
        },
    };
    EnvironmentSample {
        temperature: damped.temperature,
        humidity: damped.humidity.clamp(0.0, 100.0),
        light: damped.light.max(0.0),
        precipitation: damped.precipitation.max(0.0),
    }
}

/// `keep` is the share of the deviation from `center` that survives.
fn pull_toward(value: f64, center: f64, keep: f64) -> f64 {
    center + (value - center) * keep.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storm() -> AmbientSample {
        AmbientSample {
            temperature: 35.0,
            humidity: 95.0,
            light: 800.0,
            precipitation: 4.0,
        }
    }

    #[test]
    fn ground_passes_through() {
        let tuning = ModelTuning::default();
        let env = sample(&storm(), LocationCategory::Ground, &tuning);
        assert_eq!(env.temperature, 35.0);
        assert_eq!(env.humidity, 95.0);
        assert_eq!(env.light, 800.0);
        assert!(env.is_raining());
    }

    #[test]
    fn indoor_damps_swings_and_blocks_rain() {
        let tuning = ModelTuning::default();
        let env = sample(&storm(), LocationCategory::Indoor, &tuning);
        assert!((env.temperature - (21.0 + 14.0 * 0.3)).abs() < 1e-9);
        assert!((env.humidity - (50.0 + 45.0 * 0.5)).abs() < 1e-9);
        assert!((env.light - 320.0).abs() < 1e-9);
        assert!(!env.is_raining());
    }

    #[test]
    fn greenhouse_warms_and_pulls_humidity_up() {
        let tuning = ModelTuning::default();
        let dry = AmbientSample {
            temperature: 10.0,
            humidity: 20.0,
            light: 500.0,
            precipitation: 0.0,
        };
        let env = sample(&dry, LocationCategory::Greenhouse, &tuning);
        assert_eq!(env.temperature, 14.0);
        assert!(env.humidity > 20.0 && env.humidity < 70.0);
    }

    #[test]
    fn unknown_location_behaves_like_ground() {
        let tuning = ModelTuning::default();
        assert_eq!(
            sample(&storm(), LocationCategory::Unknown, &tuning),
            sample(&storm(), LocationCategory::Ground, &tuning)
        );
    }
}
