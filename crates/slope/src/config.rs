//! Engine configuration.
//!
//! Every tunable of the pipeline lives in [`EngineConfig`]. Defaults suit a
//! phone mounted on a mountain bike; a TOML file can override any subset of
//! them.

use std::path::Path;

use enum_map::{EnumMap, enum_map};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{errors::ConfigError, models::SourceKind};

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV_VAR: &str = "SLOPE_CONFIG";

/// How strongly altitude readings from one source are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct FilterProfile {
    /// Vertical accuracy at or below which a reading is taken unsmoothed.
    #[validate(range(min = 0.01))]
    pub reference_accuracy_m: f64,
    /// Lowest weight a new reading can get, however poor its accuracy.
    #[validate(range(min = 0.01, max = 1.0))]
    pub min_weight: f64,
}

impl FilterProfile {
    /// How far a reading falls short of the reference accuracy, in `(0, 1]`.
    pub fn accuracy_factor(&self, vertical_accuracy_m: f64) -> f64 {
        if vertical_accuracy_m <= self.reference_accuracy_m {
            return 1.0;
        }
        self.reference_accuracy_m / vertical_accuracy_m
    }

    /// Exponential-filter weight for a reading with the given vertical accuracy.
    pub fn weight(&self, vertical_accuracy_m: f64) -> f64 {
        self.accuracy_factor(vertical_accuracy_m).max(self.min_weight)
    }
}

/// Vertical-accuracy-to-smoothing mapping, one profile per altitude source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SmoothingTable {
    #[validate(nested)]
    pub gps: FilterProfile,
    #[validate(nested)]
    pub barometric: FilterProfile,
    #[validate(nested)]
    pub fused: FilterProfile,
}

impl Default for SmoothingTable {
    fn default() -> Self {
        Self {
            gps: FilterProfile {
                reference_accuracy_m: 4.0,
                min_weight: 0.15,
            },
            barometric: FilterProfile {
                reference_accuracy_m: 1.0,
                min_weight: 0.3,
            },
            fused: FilterProfile {
                reference_accuracy_m: 3.0,
                min_weight: 0.2,
            },
        }
    }
}

impl SmoothingTable {
    pub fn lookup(&self) -> EnumMap<SourceKind, FilterProfile> {
        enum_map! {
            SourceKind::Gps => self.gps,
            SourceKind::Barometric => self.barometric,
            SourceKind::Fused => self.fused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_grade_range"))]
pub struct EngineConfig {
    /// Fixes with a worse horizontal accuracy are rejected.
    #[validate(range(min = 0.1))]
    pub max_horizontal_accuracy_m: f64,

    /// Consecutive fixes without altitude tolerated before rejecting.
    pub max_missing_altitude: u32,

    /// Consecutive rejects after which a dropout warning is raised.
    #[validate(range(min = 1))]
    pub dropout_warning_threshold: u32,

    /// Speeds above this are GPS jumps, not riding.
    #[validate(range(min = 1.0))]
    pub max_speed_kmh: f64,

    /// Horizontal distance below which no grade is estimated.
    #[validate(range(min = 0.01))]
    pub distance_floor_m: f64,

    /// Largest change of the emitted grade per second, in percent.
    #[validate(range(min = 0.01))]
    pub max_grade_rate_per_s: f64,

    pub min_grade_pct: f64,
    pub max_grade_pct: f64,

    /// Samples needed before the smoothing window counts as full.
    #[validate(range(min = 2, max = 64))]
    pub window_size: usize,

    #[validate(nested)]
    pub smoothing: SmoothingTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: 25.0,
            max_missing_altitude: 5,
            dropout_warning_threshold: 5,
            max_speed_kmh: 90.0,
            distance_floor_m: 1.0,
            max_grade_rate_per_s: 8.0,
            min_grade_pct: -100.0,
            max_grade_pct: 100.0,
            window_size: 8,
            smoothing: SmoothingTable::default(),
        }
    }
}

fn validate_grade_range(config: &EngineConfig) -> Result<(), ValidationError> {
    if config.min_grade_pct < config.max_grade_pct {
        Ok(())
    } else {
        Err(ValidationError::new("grade_range"))
    }
}

impl EngineConfig {
    pub fn max_speed_mps(&self) -> f64 {
        self.max_speed_kmh / 3.6
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads the file named by `SLOPE_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => {
                tracing::info!("Loading engine config from {}", path);
                Self::load(path)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_speed_kmh = 60.0
            window_size = 5

            [smoothing.gps]
            reference_accuracy_m = 6.0
            min_weight = 0.1
            "#,
        )
        .unwrap();

        assert_eq!(config.max_speed_kmh, 60.0);
        assert_eq!(config.window_size, 5);
        assert_eq!(config.smoothing.gps.reference_accuracy_m, 6.0);
        assert_eq!(config.smoothing.barometric, SmoothingTable::default().barometric);
        assert_eq!(config.distance_floor_m, 1.0);
    }

    #[test]
    fn test_inverted_grade_range_is_rejected() {
        let result = EngineConfig::from_toml_str("min_grade_pct = 50.0\nmax_grade_pct = -50.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_out_of_range_window_is_rejected() {
        let result = EngineConfig::from_toml_str("window_size = 1\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_filter_weight_follows_accuracy() {
        let profile = SmoothingTable::default().gps;
        assert_eq!(profile.weight(2.0), 1.0);
        assert!((profile.weight(8.0) - 0.5).abs() < 1e-12);
        assert_eq!(profile.weight(1000.0), profile.min_weight);
    }

    #[test]
    fn test_lookup_table_maps_every_source() {
        let table = SmoothingTable::default();
        let lookup = table.lookup();
        assert_eq!(lookup[SourceKind::Gps], table.gps);
        assert_eq!(lookup[SourceKind::Barometric], table.barometric);
        assert_eq!(lookup[SourceKind::Fused], table.fused);
    }

    #[test]
    fn test_max_speed_conversion() {
        let config = EngineConfig {
            max_speed_kmh: 36.0,
            ..Default::default()
        };
        assert!((config.max_speed_mps() - 10.0).abs() < 1e-12);
    }
}
