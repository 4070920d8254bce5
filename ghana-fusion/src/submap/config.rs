//! Submap configuration.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// How overlap between the camera view and the active submap is measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMetric {
    /// Fraction of the submap's allocated units seen within the last
    /// `visibility_window` frames. Drops as the camera explores new space,
    /// for both dense and hashed volumes.
    UnitVisibility,

    /// Fraction of valid depth pixels with a raycast hit in the active
    /// submap. Drops when the camera leaves a bounded volume.
    RaycastCoverage,
}

/// Configuration for submap management.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmapConfig {
    /// Overlap measure used for the transition decision.
    /// Default: unit_visibility
    pub visibility_metric: VisibilityMetric,

    /// Spawn a new submap when the overlap drops below this ratio.
    /// Default: 0.2
    pub min_visibility_ratio: f32,

    /// Frames a unit stays "visible" after leaving the frustum.
    /// Default: 5
    pub visibility_window: u64,

    /// Frames the active submap must exist before it can be replaced.
    /// Prevents thrashing right after a transition.
    /// Default: 10
    pub min_frames_between_submaps: u64,

    /// Frames a superseded submap keeps being tracked to refine the
    /// constraint to its successor (0 disables overlap tracking).
    /// Default: 10
    pub overlap_frames: u64,
}

impl Default for SubmapConfig {
    fn default() -> Self {
        Self {
            visibility_metric: VisibilityMetric::UnitVisibility,
            min_visibility_ratio: 0.2,
            visibility_window: 5,
            min_frames_between_submaps: 10,
            overlap_frames: 10,
        }
    }
}

impl SubmapConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_visibility_ratio) {
            return Err(ConfigError::InvalidValue(format!(
                "min_visibility_ratio ({}) must be in [0, 1]",
                self.min_visibility_ratio
            )));
        }

        if self.visibility_window == 0 {
            return Err(ConfigError::InvalidValue(
                "visibility_window must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
