//! TOML configuration for running a simulation.
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```toml
//! dt = 0.05
//! end_time = 20.0
//! mode = "compare"
//! seed = 42
//! body_count = 500
//!
//! [randomization]
//! mass = { min = 1.0e8, max = 1.0e9 }
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::integrator::{ForceMode, PositionRule};
use crate::math::Float;
use crate::simulation::RunMode;
use crate::utils::RandomizationSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed time step.
    pub dt: Float,
    /// Total simulated time for [`Simulation::run`](crate::Simulation::run).
    pub end_time: Float,
    pub mode: RunMode,
    pub position_rule: PositionRule,
    /// Pair traversal of the sequential integrator.
    pub force_mode: ForceMode,
    /// Worker count for the parallel integrator; rayon's default when unset.
    pub threads: Option<usize>,
    /// The parallel integrator only splits systems with more than
    /// `threads * parallel_threshold_factor` bodies.
    pub parallel_threshold_factor: usize,
    /// Seed for body generation; entropy-seeded when unset.
    pub seed: Option<u64>,
    /// Number of random bodies generated by [`Simulation::from_config`](crate::Simulation::from_config).
    pub body_count: usize,
    pub randomization: RandomizationSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            end_time: 10.0,
            mode: RunMode::Parallel,
            position_rule: PositionRule::Trapezoidal,
            force_mode: ForceMode::Pairwise,
            threads: None,
            parallel_threshold_factor: 10,
            seed: None,
            body_count: 100,
            randomization: RandomizationSettings::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a file, falling back to defaults if the file
    /// is missing or invalid.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { .. }) => {
                info!("Config file {} not found. Using defaults.", path);
                Self::default()
            }
            Err(e) => {
                warn!("Failed to parse config file {}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Range;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = SimulationConfig::from_toml_str(
            r#"
            dt = 0.3
            mode = "sequential"
            seed = 9

            [randomization]
            mass = { min = 2.0, max = 3.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.dt, 0.3);
        assert_eq!(config.mode, RunMode::Sequential);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.end_time, 10.0);
        assert_eq!(config.randomization.mass, Range::new(2.0, 3.0));
        assert_eq!(config.randomization.radius, RandomizationSettings::default().radius);
    }

    #[test]
    fn toml_round_trip() {
        let config = SimulationConfig {
            mode: RunMode::Compare,
            position_rule: PositionRule::SemiImplicit,
            force_mode: ForceMode::AllPairs,
            threads: Some(3),
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("mode = \"compare\""));
        assert!(text.contains("position_rule = \"semi_implicit\""));
        assert_eq!(SimulationConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn bad_values_fail_to_parse() {
        assert!(SimulationConfig::from_toml_str("mode = \"warp\"").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SimulationConfig::load_or_default("/nonexistent/nbody-config.toml");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("nbody-config-{}.toml", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        let config = SimulationConfig {
            body_count: 7,
            ..SimulationConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = SimulationConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
