//! Configuration for the affinity engine.
//!
//! All sections default to the production constants, so an empty YAML file
//! (or no file at all) yields a working configuration. Individual values can
//! be overridden from a YAML file and a handful of environment variables.
//!
//! # Environment Variables
//!
//! - `AFFINITY_CONFIG`: path to a YAML config file
//! - `AFFINITY_DATA_DIR`: directory holding the live document and archives
//! - `AFFINITY_API_KEY`: API key for the text-generation provider
//! - `AFFINITY_BASE_URL`: OpenAI-compatible base URL
//! - `AFFINITY_MODEL`: model used for persona generation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::persona::PersonaCatalog;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    pub economy: EconomyConfig,
    pub persona: PersonaCatalog,
    pub transfer: TransferConfig,
    pub rewards: RewardConfig,
    pub storage: StorageConfig,
    pub generator: GeneratorConfig,
}

impl AffinityConfig {
    /// Load a config from a YAML file. Missing sections fall back to defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: AffinityConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from the environment.
    ///
    /// Reads the file named by `AFFINITY_CONFIG` when set, then applies the
    /// individual variable overrides on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("AFFINITY_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_yaml_file(path)?,
            _ => Self::default(),
        };

        if let Ok(dir) = std::env::var("AFFINITY_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(key) = std::env::var("AFFINITY_API_KEY") {
            config.generator.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("AFFINITY_BASE_URL") {
            config.generator.base_url = url;
        }
        if let Ok(model) = std::env::var("AFFINITY_MODEL") {
            config.generator.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.economy.validate()?;
        self.persona.validate()?;

        if self.transfer.effect_ratio <= 0.0 || self.transfer.effect_ratio > 1.0 {
            return Err(ConfigError::invalid(
                "transfer.effect_ratio must be in (0, 1]",
            ));
        }
        if self.rewards.percentage <= 0.0 {
            return Err(ConfigError::invalid("rewards.percentage must be positive"));
        }
        if self.rewards.min_count > self.rewards.max_count {
            return Err(ConfigError::invalid(
                "rewards.min_count must not exceed rewards.max_count",
            ));
        }
        if !(1..=28).contains(&self.rewards.cycle_day) {
            return Err(ConfigError::invalid("rewards.cycle_day must be in 1..=28"));
        }
        if !self.generator.timeout_secs.is_finite() || self.generator.timeout_secs <= 0.0 {
            return Err(ConfigError::invalid(
                "generator.timeout_secs must be a positive number of seconds",
            ));
        }
        if !self.generator.temperature.is_finite() || self.generator.temperature < 0.0 {
            return Err(ConfigError::invalid(
                "generator.temperature must be a non-negative number",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// Constants driving `apply_delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Factor applied to negative raw deltas before scaling.
    pub negative_amplification: f64,
    /// Score at or above which a Natural identity enters the Positive excursion.
    pub positive_excursion_boundary: f64,
    /// Score at or below which a Natural identity enters the Negative excursion.
    pub negative_excursion_boundary: f64,
    /// Lower bound for `speed_multiplier`.
    pub speed_floor: f64,
    /// Fraction removed from `speed_multiplier` on every excursion entry.
    pub excursion_speed_decay: f64,
    /// Milestone ladder: score boundary to fixed speed multiplier.
    pub ladder: BTreeMap<i64, f64>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            negative_amplification: 5.0,
            positive_excursion_boundary: 5000.0,
            negative_excursion_boundary: -2000.0,
            speed_floor: 0.05,
            excursion_speed_decay: 0.02,
            ladder: default_ladder(),
        }
    }
}

impl EconomyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.positive_excursion_boundary <= 0.0 {
            return Err(ConfigError::invalid(
                "economy.positive_excursion_boundary must be positive",
            ));
        }
        if self.negative_excursion_boundary >= 0.0 {
            return Err(ConfigError::invalid(
                "economy.negative_excursion_boundary must be negative",
            ));
        }
        if self.speed_floor <= 0.0 || self.speed_floor > 1.0 {
            return Err(ConfigError::invalid("economy.speed_floor must be in (0, 1]"));
        }
        if !(0.0..1.0).contains(&self.excursion_speed_decay) {
            return Err(ConfigError::invalid(
                "economy.excursion_speed_decay must be in [0, 1)",
            ));
        }
        if self.negative_amplification <= 0.0 {
            return Err(ConfigError::invalid(
                "economy.negative_amplification must be positive",
            ));
        }
        Ok(())
    }
}

fn default_ladder() -> BTreeMap<i64, f64> {
    [
        (-10000, 0.7),
        (-5000, 0.72),
        (-2000, 0.74),
        (-1200, 0.76),
        (-780, 0.78),
        (-550, 0.8),
        (-380, 0.82),
        (-200, 0.85),
        (-150, 0.87),
        (-50, 0.9),
        (-25, 0.93),
        (-5, 0.97),
        (0, 1.0),
        (10, 0.97),
        (25, 0.93),
        (50, 0.9),
        (100, 0.88),
        (150, 0.87),
        (200, 0.86),
        (260, 0.85),
        (320, 0.84),
        (380, 0.83),
        (460, 0.82),
        (550, 0.81),
        (660, 0.8),
        (780, 0.79),
        (950, 0.78),
        (1200, 0.76),
        (1600, 0.75),
        (2000, 0.74),
        (3000, 0.73),
        (4000, 0.72),
        (5000, 0.71),
        (7000, 0.705),
        (10000, 0.7),
    ]
    .into_iter()
    .collect()
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// Constants for the hedging transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Share of the paid amount that actually reaches the target; the rest is the fee.
    pub effect_ratio: f64,
    /// The target's score never goes below this value.
    pub target_floor: f64,
    /// Smallest amount advertised by a transfer quote.
    pub min_quote_amount: f64,
    /// `|score|` required before a user may request a custom persona or a manual restore.
    pub manual_change_min_abs_score: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            effect_ratio: 0.8,
            target_floor: -150.0,
            min_quote_amount: 0.1,
            manual_change_min_abs_score: 150.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

/// Leaderboard and cycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Share of non-zero identities that win.
    pub percentage: f64,
    /// Minimum number of winners (everyone wins below this).
    pub min_count: usize,
    /// Maximum number of winners.
    pub max_count: usize,
    /// Day of month the cycle runs.
    pub cycle_day: u32,
    /// Local time of day the cycle runs, `HH:MM`.
    pub cycle_time: String,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            percentage: 0.5,
            min_count: 3,
            max_count: 10,
            cycle_day: 1,
            cycle_time: "10:00".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Where the live document and archives live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub document_file: String,
    pub archive_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            document_file: "affinity.json".to_string(),
            archive_dir: "archive".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(&self.document_file)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.archive_dir)
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Settings for the OpenAI-compatible persona generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub timeout_secs: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.moonshot.cn/v1".to_string(),
            model: "moonshot-v1-8k".to_string(),
            api_key: None,
            temperature: 0.3,
            timeout_secs: 60.0,
        }
    }
}
