//! Read-only reference data: species profiles and fertilizer types.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::diseases::DiseaseKind;
use crate::error::ReferenceError;
use crate::plant::LocationCategory;
use crate::store::ReferenceSource;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) * 0.5
    }

    /// Position of `value` inside the range, clamped to [0, 1].
    pub fn inverse_lerp(&self, value: f64) -> f64 {
        let width = self.max - self.min;
        if width.abs() < f64::EPSILON {
            return if value >= self.max { 1.0 } else { 0.0 };
        }
        ((value - self.min) / width).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRanges {
    pub temperature: Range,
    pub humidity: Range,
    pub light: Range,
}

/// Location-specific overrides; absent fields fall back to the species defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeOverride {
    #[serde(default)]
    pub temperature: Option<Range>,
    #[serde(default)]
    pub humidity: Option<Range>,
    #[serde(default)]
    pub light: Option<Range>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityWeights {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub moisture: f64,
}

impl Default for SuitabilityWeights {
    fn default() -> Self {
        Self {
            temperature: 0.25,
            humidity: 0.25,
            light: 0.25,
            moisture: 0.25,
        }
    }
}

impl SuitabilityWeights {
    /// Weights scaled to sum to one. Degenerate weights fall back to equal weighting.
    pub fn normalized(&self) -> Self {
        let parts = [self.temperature, self.humidity, self.light, self.moisture];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Self::default();
        }
        let sum: f64 = parts.iter().sum();
        if sum <= f64::EPSILON {
            return Self::default();
        }
        Self {
            temperature: self.temperature / sum,
            humidity: self.humidity / sum,
            light: self.light / sum,
            moisture: self.moisture / sum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FertilizerCategory {
    Balanced,
    NitrogenRich,
    PhosphorusRich,
    PotassiumRich,
    Organic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerType {
    pub name: String,
    pub category: FertilizerCategory,
    pub base_nutrient: f64,
    pub duration_hours: f64,
}

fn default_max_scale() -> f64 {
    1.0
}

fn default_initial_scale() -> f64 {
    0.1
}

fn default_progression_rate() -> f64 {
    0.05
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesProfile {
    pub name: String,
    /// Scale gained per second under perfect conditions.
    pub base_growth_rate: f64,
    #[serde(default = "default_max_scale")]
    pub max_scale: f64,
    #[serde(default = "default_initial_scale")]
    pub initial_scale: f64,
    pub optimal_moisture: f64,
    pub moisture_range: f64,
    pub ranges: EnvironmentRanges,
    #[serde(default)]
    pub location_overrides: HashMap<LocationCategory, RangeOverride>,
    #[serde(default)]
    pub weights: SuitabilityWeights,
    /// Nutrient lost per hour at reference light.
    pub nutrient_depletion_rate: f64,
    pub preferred_fertilizer: FertilizerCategory,
    pub fertilizer_boost: f64,
    #[serde(default)]
    pub disease_thresholds: HashMap<String, f64>,
    #[serde(default = "default_progression_rate")]
    pub disease_progression_rate: f64,
    /// Diseases this species can contract, in evaluation priority order.
    #[serde(default)]
    pub diseases: Vec<DiseaseKind>,
}

impl SpeciesProfile {
    /// Effective ranges for a location, falling back per dimension.
    pub fn ranges_for(&self, location: LocationCategory) -> EnvironmentRanges {
        let defaults = self.ranges;
        match self.location_overrides.get(&location) {
            Some(over) => EnvironmentRanges {
                temperature: over.temperature.unwrap_or(defaults.temperature),
                humidity: over.humidity.unwrap_or(defaults.humidity),
                light: over.light.unwrap_or(defaults.light),
            },
            None => defaults,
        }
    }

    pub fn moisture_band(&self) -> Range {
        Range::new(
            self.optimal_moisture - self.moisture_range,
            self.optimal_moisture + self.moisture_range,
        )
    }

    pub fn threshold(&self, key: &str) -> Option<f64> {
        self.disease_thresholds.get(key).copied()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("species must have a name");
        }
        if self.base_growth_rate < 0.0 {
            bail!("species '{}' has a negative growth rate", self.name);
        }
        if self.max_scale <= 0.0 || self.initial_scale > self.max_scale {
            bail!(
                "species '{}' needs 0 < initial_scale <= max_scale",
                self.name
            );
        }
        if self.moisture_range < 0.0 {
            bail!("species '{}' has a negative moisture range", self.name);
        }
        if !self.fertilizer_boost.is_finite() || self.fertilizer_boost < 0.0 {
            bail!("species '{}' fertilizer boost must be >= 0", self.name);
        }
        Ok(())
    }
}

/// File-backed reference catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceCatalog {
    #[serde(default)]
    pub species: Vec<SpeciesProfile>,
    #[serde(default)]
    pub fertilizers: Vec<FertilizerType>,
}

impl ReferenceCatalog {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let catalog: ReferenceCatalog =
            serde_yaml::from_str(text).context("Failed to parse reference catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for species in &self.species {
            species.validate()?;
            if seen.contains(&species.name.as_str()) {
                bail!("species '{}' defined more than once", species.name);
            }
            seen.push(species.name.as_str());
        }
        for fertilizer in &self.fertilizers {
            if fertilizer.duration_hours < 0.0 || fertilizer.base_nutrient < 0.0 {
                bail!("fertilizer '{}' has negative amounts", fertilizer.name);
            }
        }
        Ok(())
    }

    pub fn species(&self, name: &str) -> Option<&SpeciesProfile> {
        self.species.iter().find(|s| s.name == name)
    }

    pub fn fertilizer(&self, name: &str) -> Option<&FertilizerType> {
        self.fertilizers.iter().find(|f| f.name == name)
    }
}

pub struct CatalogLoader {
    base_dir: PathBuf,
}

impl CatalogLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<ReferenceCatalog> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        ReferenceCatalog::from_yaml(&data).with_context(|| format!("In {}", path.display()))
    }
}

/// Catalog re-read from disk on every lookup, so the reference cache picks up
/// edits when its entries expire.
pub struct CatalogFile {
    loader: CatalogLoader,
    file: PathBuf,
}

impl CatalogFile {
    pub fn new(base_dir: impl AsRef<Path>, file: impl AsRef<Path>) -> Self {
        Self {
            loader: CatalogLoader::new(base_dir),
            file: file.as_ref().to_path_buf(),
        }
    }

    fn catalog(&self) -> Result<ReferenceCatalog, ReferenceError> {
        self.loader
            .load(&self.file)
            .map_err(|err| ReferenceError::Source(format!("{err:#}")))
    }
}

impl ReferenceSource for CatalogFile {
    fn load_species(&self, name: &str) -> Result<SpeciesProfile, ReferenceError> {
        self.catalog()?.load_species(name)
    }

    fn load_fertilizer(&self, name: &str) -> Result<FertilizerType, ReferenceError> {
        self.catalog()?.load_fertilizer(name)
    }
}
