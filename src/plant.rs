use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diseases::DiseaseKind;

pub const MOISTURE_MAX: f64 = 100.0;
pub const NUTRIENT_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCategory {
    Ground,
    Indoor,
    Greenhouse,
    /// A stored value this build does not recognise. Treated as open ground
    /// with no location-specific behaviour.
    Unknown,
}

impl LocationCategory {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ground" | "outdoor" | "open_ground" => Self::Ground,
            "indoor" => Self::Indoor,
            "greenhouse" | "enclosed_greenhouse" => Self::Greenhouse,
            _ => Self::Unknown,
        }
    }

    pub fn is_ground(self) -> bool {
        matches!(self, Self::Ground)
    }

    pub fn is_greenhouse(self) -> bool {
        matches!(self, Self::Greenhouse)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

fn default_slowing() -> f64 {
    1.0
}

fn default_boost() -> f64 {
    1.0
}

/// Persisted state of one planted instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRecord {
    pub id: String,
    pub owner: String,
    pub species: String,
    #[serde(deserialize_with = "lenient::location")]
    pub location: LocationCategory,
    #[serde(default)]
    pub position: Position,
    pub scale: f64,
    #[serde(default)]
    pub reached_max_scale: bool,
    pub moisture: f64,
    #[serde(default)]
    pub nutrient: f64,
    #[serde(default)]
    pub fertilizer_remaining_secs: f64,
    #[serde(default)]
    pub fertilizer: Option<String>,
    #[serde(default = "default_boost")]
    pub fertilizer_boost: f64,
    #[serde(
        default,
        serialize_with = "lenient::serialize_disease",
        deserialize_with = "lenient::disease"
    )]
    pub disease: Option<DiseaseKind>,
    #[serde(default)]
    pub disease_progress: f64,
    #[serde(default = "default_slowing")]
    pub disease_slowing: f64,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub last_growth_update: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub last_disease_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shade_active: bool,
    #[serde(default)]
    pub shade_secs: f64,
}

impl PlantRecord {
    /// Fresh record for a seed planted at `now`. Timestamps start at `now`, so
    /// the first update only covers time since planting.
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        species: impl Into<String>,
        location: LocationCategory,
        position: Position,
        initial_scale: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            species: species.into(),
            location,
            position,
            scale: initial_scale,
            reached_max_scale: false,
            moisture: 50.0,
            nutrient: 0.0,
            fertilizer_remaining_secs: 0.0,
            fertilizer: None,
            fertilizer_boost: 1.0,
            disease: None,
            disease_progress: 0.0,
            disease_slowing: 1.0,
            last_growth_update: Some(now),
            last_disease_check: Some(now),
            shade_active: false,
            shade_secs: 0.0,
        }
    }

    pub fn is_diseased(&self) -> bool {
        self.disease.is_some()
    }

    pub fn fertilizer_active(&self) -> bool {
        self.nutrient > 0.0 && self.fertilizer_remaining_secs > 0.0
    }

    pub fn clear_disease(&mut self) {
        self.disease = None;
        self.disease_progress = 0.0;
        self.disease_slowing = 1.0;
        self.shade_secs = 0.0;
    }

    pub fn clear_fertilizer(&mut self) {
        self.nutrient = 0.0;
        self.fertilizer_remaining_secs = 0.0;
        self.fertilizer = None;
        self.fertilizer_boost = 1.0;
    }

    /// Re-establishes the record invariants after any mutation.
    pub fn normalize(&mut self) {
        self.moisture = clamp_or(self.moisture, 0.0, MOISTURE_MAX, 0.0);
        self.nutrient = clamp_or(self.nutrient, 0.0, NUTRIENT_MAX, 0.0);
        self.fertilizer_remaining_secs = self.fertilizer_remaining_secs.max(0.0);
        if !self.fertilizer_boost.is_finite() || self.fertilizer_boost < 0.0 {
            self.fertilizer_boost = 1.0;
        }
        if self.disease.is_none() {
            self.disease_progress = 0.0;
            self.disease_slowing = 1.0;
        } else {
            self.disease_progress = clamp_or(self.disease_progress, 0.0, 1.0, 0.0);
            self.disease_slowing = clamp_or(self.disease_slowing, 0.0, 1.0, 1.0);
        }
        if !self.location.is_ground() {
            self.shade_active = false;
            self.shade_secs = 0.0;
        }
        self.shade_secs = self.shade_secs.max(0.0);
    }
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

pub(crate) mod lenient {
    use super::*;

    const NONE_SENTINEL: &str = "None";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Seconds(i64),
        Other(serde::de::IgnoredAny),
    }

    /// Unparseable timestamps read as missing.
    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
        Ok(match raw {
            Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Some(RawTimestamp::Seconds(secs)) if secs > 0 => Utc.timestamp_opt(secs, 0).single(),
            _ => None,
        })
    }

    pub fn location<'de, D>(deserializer: D) -> Result<LocationCategory, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(LocationCategory::parse)
            .unwrap_or(LocationCategory::Unknown))
    }

    /// Unrecognised disease names read as healthy.
    pub fn disease<'de, D>(deserializer: D) -> Result<Option<DiseaseKind>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(DiseaseKind::from_name))
    }

    pub fn serialize_disease<S>(value: &Option<DiseaseKind>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(kind) => serializer.serialize_str(kind.name()),
            None => serializer.serialize_str(NONE_SENTINEL),
        }
    }
}
