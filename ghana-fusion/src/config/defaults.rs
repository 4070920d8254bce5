//! Default value functions for serde deserialization.

use crate::core::{FrameSize, Intrinsics};

pub fn frame_size() -> FrameSize {
    FrameSize::new(640, 480)
}

pub fn intrinsics() -> Intrinsics {
    Intrinsics::centered(frame_size(), 525.0)
}

pub fn depth_factor() -> f32 {
    5000.0
}

pub fn bilateral_sigma_depth() -> f32 {
    0.04
}

pub fn bilateral_sigma_spatial() -> f32 {
    4.5
}

pub fn bilateral_kernel_size() -> usize {
    7
}

pub fn pyramid_levels() -> usize {
    3
}

pub fn icp_iterations() -> Vec<usize> {
    vec![10, 5, 4]
}

pub fn icp_dist_thresh() -> f32 {
    0.1
}

pub fn icp_angle_thresh() -> f32 {
    30f32.to_radians()
}

pub fn icp_min_correspondences() -> usize {
    100
}
