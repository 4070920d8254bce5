//! Pose graph optimizer configuration.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Configuration for Levenberg-Marquardt pose graph optimization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphOptimizerConfig {
    /// Maximum LM iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stop once the relative chi² improvement of an accepted step drops
    /// below this value.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Stop once chi² drops below this absolute value.
    #[serde(default = "default_min_error")]
    pub min_error: f64,

    /// Initial LM damping.
    #[serde(default = "default_initial_damping")]
    pub initial_damping: f64,

    /// Damping above which the solve is abandoned.
    #[serde(default = "default_max_damping")]
    pub max_damping: f64,

    /// Optimize after every N new submaps (0 = never).
    #[serde(default = "default_optimize_every_n_submaps")]
    pub optimize_every_n_submaps: usize,

    /// Optimize every N frames (0 = never).
    #[serde(default)]
    pub optimize_every_n_frames: u64,

    /// Run optimization on a worker thread instead of inline.
    #[serde(default)]
    pub background: bool,
}

fn default_max_iterations() -> usize {
    50
}

fn default_convergence_threshold() -> f64 {
    1e-6
}

fn default_min_error() -> f64 {
    1e-10
}

fn default_initial_damping() -> f64 {
    1e-4
}

fn default_max_damping() -> f64 {
    1e10
}

fn default_optimize_every_n_submaps() -> usize {
    1
}

impl Default for GraphOptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
            min_error: default_min_error(),
            initial_damping: default_initial_damping(),
            max_damping: default_max_damping(),
            optimize_every_n_submaps: default_optimize_every_n_submaps(),
            optimize_every_n_frames: 0,
            background: false,
        }
    }
}

impl GraphOptimizerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "optimizer max_iterations must be > 0".to_string(),
            ));
        }
        if !(self.initial_damping > 0.0 && self.max_damping > self.initial_damping) {
            return Err(ConfigError::InvalidValue(format!(
                "optimizer damping must satisfy 0 < initial ({}) < max ({})",
                self.initial_damping, self.max_damping
            )));
        }
        if !(self.convergence_threshold >= 0.0 && self.min_error >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "optimizer thresholds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
