use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

fn default_seed() -> u64 {
    7
}

fn default_interval_secs() -> u64 {
    60
}

fn default_idle_threshold_secs() -> i64 {
    120
}

fn default_max_concurrent_users() -> usize {
    8
}

fn default_batch_size() -> usize {
    25
}

fn default_max_disease_checks() -> u32 {
    // two weeks of hourly checks
    24 * 14
}

fn default_stats_history() -> usize {
    100
}

fn default_session_tick_secs() -> u64 {
    5
}

fn default_refresh_secs() -> u64 {
    900
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub tuning: ModelTuning,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            scheduler: SchedulerConfig::default(),
            session: SessionConfig::default(),
            reference: ReferenceConfig::default(),
            tuning: ModelTuning::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How a catch-up pass picks weather for the elapsed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpMode {
    /// One sample, chosen for the evaluation instant.
    #[default]
    SingleSample,
    /// One pipeline run per elapsed calendar hour.
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: i64,
    #[serde(default = "default_max_concurrent_users")]
    pub max_concurrent_users: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_disease_checks")]
    pub max_disease_checks_per_pass: u32,
    #[serde(default)]
    pub mode: CatchUpMode,
    #[serde(default = "default_stats_history")]
    pub stats_history: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
            max_concurrent_users: default_max_concurrent_users(),
            batch_size: default_batch_size(),
            max_disease_checks_per_pass: default_max_disease_checks(),
            mode: CatchUpMode::default(),
            stats_history: default_stats_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_tick_secs")]
    pub tick_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_session_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Constants shared by every model function. Both drivers read the same
/// values, so a session tick and a catch-up pass agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTuning {
    /// Moisture lost per second at a full humidity deficit.
    pub evaporation_rate: f64,
    pub greenhouse_evaporation_factor: f64,
    /// Largest moisture bonus ambient humidity can add to effective moisture.
    pub humidity_moisture_bonus: f64,
    pub watering_increment: f64,
    pub fertilizer_mismatch_penalty: f64,
    /// Light (W/m2) at which fertilizer depletes at its nominal rate.
    pub reference_light: f64,
    pub light_depletion_slope: f64,
    pub greenhouse_depletion_factor: f64,
    pub rain_depletion_factor: f64,
    pub disease_check_interval_secs: i64,
    pub partial_cure_decrement: f64,
    pub shade_cure_secs: f64,
    pub indoor_comfort_temperature: f64,
    pub indoor_temperature_damping: f64,
    pub indoor_comfort_humidity: f64,
    pub indoor_humidity_damping: f64,
    pub indoor_light_factor: f64,
    pub greenhouse_temperature_offset: f64,
    pub greenhouse_comfort_humidity: f64,
    pub greenhouse_humidity_damping: f64,
    pub greenhouse_light_factor: f64,
}

impl Default for ModelTuning {
    fn default() -> Self {
        Self {
            evaporation_rate: 0.0005,
            greenhouse_evaporation_factor: 0.5,
            humidity_moisture_bonus: 10.0,
            watering_increment: 25.0,
            fertilizer_mismatch_penalty: 0.8,
            reference_light: 400.0,
            light_depletion_slope: 0.5,
            greenhouse_depletion_factor: 0.5,
            rain_depletion_factor: 1.2,
            disease_check_interval_secs: 3_600,
            partial_cure_decrement: 0.25,
            shade_cure_secs: 7_200.0,
            indoor_comfort_temperature: 21.0,
            indoor_temperature_damping: 0.3,
            indoor_comfort_humidity: 50.0,
            indoor_humidity_damping: 0.5,
            indoor_light_factor: 0.4,
            greenhouse_temperature_offset: 4.0,
            greenhouse_comfort_humidity: 70.0,
            greenhouse_humidity_damping: 0.6,
            greenhouse_light_factor: 0.85,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            bail!("scheduler.interval_secs must be greater than zero");
        }
        if self.scheduler.batch_size == 0 {
            bail!("scheduler.batch_size must be greater than zero");
        }
        if self.scheduler.max_concurrent_users == 0 {
            bail!("scheduler.max_concurrent_users must be greater than zero");
        }
        if self.session.tick_interval_secs == 0 {
            bail!("session.tick_interval_secs must be greater than zero");
        }
        if self.tuning.disease_check_interval_secs <= 0 {
            bail!("tuning.disease_check_interval_secs must be positive");
        }
        let penalty = self.tuning.fertilizer_mismatch_penalty;
        if !(penalty > 0.0 && penalty <= 1.0) {
            bail!("tuning.fertilizer_mismatch_penalty must be in (0, 1], got {penalty}");
        }
        if self.tuning.reference_light <= 0.0 {
            bail!("tuning.reference_light must be positive");
        }
        Ok(())
    }
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<AppConfig> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.scheduler.idle_threshold_secs, 120);
        assert_eq!(config.scheduler.batch_size, 25);
        assert_eq!(config.scheduler.mode, CatchUpMode::SingleSample);
        assert_eq!(config.tuning, ModelTuning::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_tuning_keeps_other_defaults() {
        let yaml = "tuning:\n  watering_increment: 40.0\nscheduler:\n  mode: hourly\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tuning.watering_increment, 40.0);
        assert_eq!(config.tuning.fertilizer_mismatch_penalty, 0.8);
        assert_eq!(config.scheduler.mode, CatchUpMode::Hourly);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.scheduler.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.yaml"), "seed: 11\n").unwrap();
        let config = ConfigLoader::new(dir.path()).load("app.yaml").unwrap();
        assert_eq!(config.seed, 11);
    }
}
