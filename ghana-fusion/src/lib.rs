//! # GhanaFusion
//!
//! Large-scale dense 3D reconstruction from a depth camera.
//!
//! ## Overview
//!
//! GhanaFusion tracks a moving depth camera and fuses its frames into TSDF
//! volumes. The scene is split into submaps so it can grow without bound:
//!
//! - **Tracking** - Coarse-to-fine point-to-plane ICP against a raycast of the model
//! - **Fusion** - Projective TSDF integration into a dense or hashed volume
//! - **Submaps** - A new volume is started when the view leaves the active one
//! - **Drift correction** - Submap poses are refined by a pose graph solve
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ghana_fusion::{LargeKinfu, Params};
//!
//! let mut kinfu = LargeKinfu::new(Params::hash_tsdf_params(false))?;
//!
//! for depth in frames {
//!     let status = kinfu.update(&depth)?;
//!     if !status.tracked {
//!         log::warn!("Tracking lost at frame {}", status.frame_id);
//!     }
//! }
//!
//! let cloud = kinfu.get_cloud();
//! println!("{} surface points in {} submaps", cloud.len(), kinfu.submaps().len());
//! ```
//!
//! ## Coordinate System
//!
//! Camera frames use the depth-sensor convention:
//! - X: Right in the image
//! - Y: Down in the image
//! - Z: Forward along the optical axis
//!
//! The first camera pose defines the world frame.

#![warn(missing_docs)]

// Core types: poses, intrinsics, images, pyramids
pub mod core;

// Unified configuration
pub mod config;

// TSDF volumes
pub mod volume;

// ICP camera tracking
pub mod tracking;

// Submap lifecycle
pub mod submap;

// Pose graph and optimizers
pub mod graph;

// Phong rendering of raycasts
pub mod render;

// Top-level pipeline
pub mod kinfu;

mod error;

pub use crate::core::{
    BilateralFilter, DepthFilter, DepthFrame, FramePyramid, FrameSize, Image, Intrinsics,
    NormalMap, PassThrough, PointMap, Pose,
};

pub use config::{ConfigError, Params};

pub use error::{FusionError, Result};

pub use graph::{
    BackgroundOptimizer, GraphError, GraphOptimizer, GraphOptimizerConfig, OptimizationResult,
    PoseGraph, TerminationReason,
};

pub use kinfu::{FrameStatus, KinfuState, LargeKinfu, PointCloud};

pub use render::{RgbaImage, render_phong};

pub use submap::{
    Submap, SubmapConfig, SubmapCorrection, SubmapId, SubmapManager, SubmapState,
    VisibilityMetric,
};

pub use tracking::{IcpConfig, IcpResult, IcpTracker, TrackingError};

pub use volume::{HashTsdfVolume, RaycastResult, TsdfVolume, Volume, VolumeKind, VolumeParams};
