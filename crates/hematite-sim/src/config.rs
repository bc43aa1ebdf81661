//! Simulation parameters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameter validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("node_count must be at least 1, got {0}")]
    NoNodes(u32),

    #[error("{field} must be a probability in [0, 1], got {value}")]
    BadRate { field: &'static str, value: f64 },

    #[error("min_delay {min} exceeds max_delay {max}")]
    InvertedDelay { min: u64, max: u64 },
}

/// The global parameter source for one simulation run.
///
/// Everything nondeterministic in a run derives from `seed`; two runs with
/// the same config produce identical event logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of nodes; ids run `1..=node_count` on port 0, and id 1 is
    /// the introducer.
    pub node_count: u32,

    /// Master RNG seed.
    pub seed: u64,

    /// Probability an outbound frame is silently lost.
    pub drop_rate: f64,

    /// Probability a delivered frame is delivered twice.
    pub duplicate_rate: f64,

    /// Delivery delay bounds, in ticks. The network never delivers in the
    /// sending tick: a `min_delay` of 0 is treated as 1.
    pub min_delay: u64,
    pub max_delay: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            node_count: 5,
            seed: 42,
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            min_delay: 1,
            max_delay: 1,
        }
    }
}

impl SimConfig {
    /// Checks the parameters before a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::NoNodes(self.node_count));
        }
        for (field, value) in [
            ("drop_rate", self.drop_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ConfigError::BadRate { field, value });
            }
        }
        let min = self.min_delay.max(1);
        let max = self.max_delay.max(1);
        if min > max {
            return Err(ConfigError::InvertedDelay { min, max });
        }
        Ok(())
    }

    /// Delay bounds with the no-same-tick-delivery floor applied.
    pub(crate) fn delay_bounds(&self) -> (u64, u64) {
        (self.min_delay.max(1), self.max_delay.max(1))
    }
}
