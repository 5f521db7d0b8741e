//! Run configuration consumed by the integrator.
//!
//! Defaults come from [`crate::constants`]. A launcher can override any field
//! through `HERMITE_*` environment variables with [`SimulationConfig::from_env`]:
//!
//! | Variable                  | Field             |
//! |---------------------------|-------------------|
//! | `HERMITE_E2`              | `softening2`      |
//! | `HERMITE_ETA_S`           | `eta_s`           |
//! | `HERMITE_ETA_N`           | `eta_n`           |
//! | `HERMITE_ITIME`           | `itime`           |
//! | `HERMITE_ITERATIONS`      | `iterations`      |
//! | `HERMITE_BLOCK_SIZE`      | `block_size`      |
//! | `HERMITE_J_PARTITIONS`    | `j_partitions`    |
//! | `HERMITE_ENERGY_INTERVAL` | `energy_interval` |
//! | `HERMITE_THREADS`         | `threads`         |

use std::{env, str::FromStr};

use crate::{constants, error::HermiteError, timestep::is_power_of_two};

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Softening length squared, added to every pair distance.
    pub softening2: f64,
    /// Accuracy parameter for the start-up steps.
    pub eta_s: f64,
    /// Accuracy parameter for the Aarseth step criterion.
    pub eta_n: f64,
    /// Stop once the global clock reaches this time.
    pub itime: f64,
    /// Stop after this many block ticks.
    pub iterations: u64,
    pub dt_min: f64,
    pub dt_max: f64,
    pub g: f64,
    /// i-particles per work group and width of a cached j-tile.
    pub block_size: usize,
    /// Number of j-partitions summed independently before the reduction.
    pub j_partitions: usize,
    /// Ticks between energy samples, 0 disables sampling.
    pub energy_interval: u64,
    /// Upper bound on CPU worker threads.
    pub threads: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            softening2: constants::SOFTENING2,
            eta_s: constants::ETA_S,
            eta_n: constants::ETA_N,
            itime: constants::ITIME,
            iterations: constants::ITERATIONS,
            dt_min: constants::D_TIME_MIN,
            dt_max: constants::D_TIME_MAX,
            g: constants::G,
            block_size: constants::BLOCK_SIZE,
            j_partitions: constants::J_PARTITIONS,
            energy_interval: constants::ENERGY_INTERVAL,
            threads: constants::MAX_THREADS,
        }
    }
}

fn invalid(msg: String) -> HermiteError {
    HermiteError::InvalidConfig(msg)
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), HermiteError> {
        if !(self.softening2.is_finite() && self.softening2 > 0.0) {
            return Err(invalid(format!(
                "softening2 must be positive, got {}",
                self.softening2
            )));
        }
        for (name, value) in [("eta_s", self.eta_s), ("eta_n", self.eta_n), ("g", self.g)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.itime > 0.0) {
            return Err(invalid(format!("itime must be positive, got {}", self.itime)));
        }
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1".to_owned()));
        }
        if !is_power_of_two(self.dt_min) || !is_power_of_two(self.dt_max) {
            return Err(invalid(format!(
                "step limits must be powers of two, got [{}, {}]",
                self.dt_min, self.dt_max
            )));
        }
        if self.dt_min > self.dt_max {
            return Err(invalid(format!(
                "dt_min {} exceeds dt_max {}",
                self.dt_min, self.dt_max
            )));
        }
        if !self.block_size.is_power_of_two() {
            return Err(invalid(format!(
                "block_size must be a power of two, got {}",
                self.block_size
            )));
        }
        if self.j_partitions == 0 || self.j_partitions > u16::MAX as usize {
            return Err(invalid(format!(
                "j_partitions must be in 1..=65535, got {}",
                self.j_partitions
            )));
        }
        if self.threads == 0 {
            return Err(invalid("threads must be at least 1".to_owned()));
        }
        Ok(())
    }

    /// Defaults overridden by `HERMITE_*` variables, validated.
    pub fn from_env() -> Result<Self, HermiteError> {
        let mut config = Self::default();
        override_from_env("HERMITE_E2", &mut config.softening2)?;
        override_from_env("HERMITE_ETA_S", &mut config.eta_s)?;
        override_from_env("HERMITE_ETA_N", &mut config.eta_n)?;
        override_from_env("HERMITE_ITIME", &mut config.itime)?;
        override_from_env("HERMITE_ITERATIONS", &mut config.iterations)?;
        override_from_env("HERMITE_BLOCK_SIZE", &mut config.block_size)?;
        override_from_env("HERMITE_J_PARTITIONS", &mut config.j_partitions)?;
        override_from_env("HERMITE_ENERGY_INTERVAL", &mut config.energy_interval)?;
        override_from_env("HERMITE_THREADS", &mut config.threads)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse `key` into `slot` when it is set.
pub fn override_from_env<T: FromStr>(key: &str, slot: &mut T) -> Result<(), HermiteError>
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        *slot = parse_value(key, &raw)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, HermiteError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| invalid(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn default_step_limits_are_powers_of_two() {
        assert_eq!(constants::D_TIME_MIN, 2f64.powi(-23));
        assert_eq!(constants::D_TIME_MAX, 2f64.powi(-3));
    }

    #[test]
    fn rejects_zero_softening() {
        let config = SimulationConfig {
            softening2: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HermiteError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_non_power_of_two_steps() {
        let config = SimulationConfig {
            dt_max: 0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SimulationConfig {
            dt_min: 0.25,
            dt_max: 0.125,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_other_power_of_two_limits() {
        let config = SimulationConfig {
            dt_min: 2f64.powi(-30),
            dt_max: 1.0,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_layout() {
        for (block_size, j_partitions) in [(0, 16), (48, 16), (32, 0)] {
            let config = SimulationConfig {
                block_size,
                j_partitions,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{block_size} / {j_partitions}");
        }
    }

    #[test]
    fn parse_value_reports_key() {
        let err = parse_value::<f64>("HERMITE_ITIME", "soon").unwrap_err();
        assert!(err.to_string().contains("HERMITE_ITIME"));
        assert_eq!(parse_value::<u64>("HERMITE_ITERATIONS", " 12 ").unwrap(), 12);
    }
}
