//! Unified configuration loading for GhanaFusion.
//!
//! Loads all parameters from a single YAML file with sensible defaults.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ghana_fusion::config::Params;
//!
//! // Load from default path (configs/fusion.yaml)
//! let params = Params::load_default()?;
//!
//! // Or start from a preset (no file needed)
//! let params = Params::hash_tsdf_params(false);
//! params.validate()?;
//! ```
//!
//! ## Configuration Sections
//!
//! | Section | Description |
//! |---------|-------------|
//! | [`CameraSection`] | Frame size, intrinsics, depth units |
//! | [`PreprocessSection`] | Bilateral filter, depth truncation |
//! | [`TrackingSection`] | Pyramid, ICP thresholds, integration gate |
//! | [`VolumeParams`](crate::volume::VolumeParams) | Per-submap TSDF volume |
//! | [`SubmapConfig`](crate::submap::SubmapConfig) | Submap transition policy |
//! | [`GraphOptimizerConfig`](crate::graph::GraphOptimizerConfig) | Pose graph solve and triggers |
//! | [`RenderSection`] | Light position |
//!
//! ## Example YAML
//!
//! ```yaml
//! camera:
//!   frame_size: { width: 640, height: 480 }
//!   intrinsics: { fx: 525.0, fy: 525.0, cx: 319.5, cy: 239.5 }
//!   depth_factor: 5000.0      # TUM PNG depth
//!
//! tracking:
//!   pyramid_levels: 3
//!   icp_iterations: [10, 5, 4] # finest level first
//!
//! volume:
//!   kind: hash_tsdf
//!   voxel_size: 0.0058
//!   tsdf_trunc_dist: 0.041
//!
//! submap:
//!   visibility_metric: unit_visibility
//!   min_visibility_ratio: 0.2
//!
//! optimizer:
//!   optimize_every_n_submaps: 1
//!   background: true
//! ```

mod defaults;
mod error;
mod params;
mod sections;

pub use error::ConfigError;
pub use params::Params;
pub use sections::{CameraSection, PreprocessSection, RenderSection, TrackingSection};
