//! Sensor, preprocessing, tracking and rendering sections.

use serde::{Deserialize, Serialize};

use crate::core::{BilateralFilter, FrameSize, Intrinsics};
use crate::tracking::IcpConfig;

use super::defaults;

/// Depth camera section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraSection {
    /// Frame size in pixels
    #[serde(default = "defaults::frame_size")]
    pub frame_size: FrameSize,

    /// Depth camera intrinsics
    #[serde(default = "defaults::intrinsics")]
    pub intrinsics: Intrinsics,

    /// Raw depth units per meter
    /// (5000 for TUM PNGs, 1000 for Kinect 2, 1 for metric floats)
    #[serde(default = "defaults::depth_factor")]
    pub depth_factor: f32,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            frame_size: defaults::frame_size(),
            intrinsics: defaults::intrinsics(),
            depth_factor: defaults::depth_factor(),
        }
    }
}

/// Depth preprocessing section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreprocessSection {
    /// Bilateral depth sigma (meters)
    #[serde(default = "defaults::bilateral_sigma_depth")]
    pub bilateral_sigma_depth: f32,

    /// Bilateral spatial sigma (pixels)
    #[serde(default = "defaults::bilateral_sigma_spatial")]
    pub bilateral_sigma_spatial: f32,

    /// Bilateral kernel size (pixels, odd)
    #[serde(default = "defaults::bilateral_kernel_size")]
    pub bilateral_kernel_size: usize,

    /// Depth beyond this many meters is zeroed before anything else (0 disables)
    #[serde(default)]
    pub truncate_threshold: f32,
}

impl Default for PreprocessSection {
    fn default() -> Self {
        Self {
            bilateral_sigma_depth: defaults::bilateral_sigma_depth(),
            bilateral_sigma_spatial: defaults::bilateral_sigma_spatial(),
            bilateral_kernel_size: defaults::bilateral_kernel_size(),
            truncate_threshold: 0.0,
        }
    }
}

impl PreprocessSection {
    /// Build the default depth filter
    pub fn to_bilateral_filter(&self) -> BilateralFilter {
        BilateralFilter::new(
            self.bilateral_sigma_depth,
            self.bilateral_sigma_spatial,
            self.bilateral_kernel_size,
        )
    }
}

/// Camera tracking section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackingSection {
    /// Number of pyramid levels for ICP
    #[serde(default = "defaults::pyramid_levels")]
    pub pyramid_levels: usize,

    /// ICP iterations per pyramid level, finest first
    #[serde(default = "defaults::icp_iterations")]
    pub icp_iterations: Vec<usize>,

    /// ICP correspondence distance threshold (meters)
    #[serde(default = "defaults::icp_dist_thresh")]
    pub icp_dist_thresh: f32,

    /// ICP normal angle threshold (radians)
    #[serde(default = "defaults::icp_angle_thresh")]
    pub icp_angle_thresh: f32,

    /// Minimum surviving correspondences per ICP iteration
    #[serde(default = "defaults::icp_min_correspondences")]
    pub icp_min_correspondences: usize,

    /// Integrate only when the camera moved at least this much since the
    /// last integration (radians + meters/2)
    #[serde(default)]
    pub tsdf_min_camera_movement: f32,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            pyramid_levels: defaults::pyramid_levels(),
            icp_iterations: defaults::icp_iterations(),
            icp_dist_thresh: defaults::icp_dist_thresh(),
            icp_angle_thresh: defaults::icp_angle_thresh(),
            icp_min_correspondences: defaults::icp_min_correspondences(),
            tsdf_min_camera_movement: 0.0,
        }
    }
}

impl TrackingSection {
    /// Convert to IcpConfig
    pub fn to_icp_config(&self) -> IcpConfig {
        IcpConfig {
            iterations: self.icp_iterations.clone(),
            dist_thresh: self.icp_dist_thresh,
            angle_thresh: self.icp_angle_thresh,
            min_correspondences: self.icp_min_correspondences,
            ..Default::default()
        }
    }
}

/// Rendering section
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RenderSection {
    /// Light position in world coordinates (meters)
    #[serde(default)]
    pub light_pose: [f32; 3],
}
