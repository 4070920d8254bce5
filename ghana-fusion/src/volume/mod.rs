//! TSDF volumes: dense grid and spatially hashed blocks.
//!
//! Both layouts fuse depth with a projective truncated signed distance and
//! share the same raycaster and surface extraction through [`TsdfSource`].
//!
//! ## Frames
//!
//! ```text
//!   world ──submap pose──► submap ──volume pose──► volume (voxel grid)
//!                             ▲
//!                        camera pose
//! ```
//!
//! Every `Volume` method takes camera poses in the submap frame and returns
//! geometry in the submap frame (or the camera frame for raycasts).
//!
//! ## Integration
//!
//! For each voxel center `p` projected to pixel `(u, v)` with depth `d`:
//!
//! ```text
//! sdf  = d - p.z
//! skip if sdf < -trunc                   (occluded)
//! tsdf = min(1, sdf / trunc)
//! tsdf' = (tsdf_old · w + tsdf) / (w + 1),  w' = min(w + 1, max_weight)
//! ```

mod config;
mod hash_tsdf;
mod raycast;
mod surface;
mod tsdf;
mod voxel;

use nalgebra::{Point3, Vector3};

pub use config::{VolumeKind, VolumeParams};
pub use hash_tsdf::{BlockCoord, HashTsdfVolume, VolumeUnit};
pub use raycast::RaycastResult;
pub use tsdf::TsdfVolume;
pub use voxel::{TsdfSource, TsdfVoxel, VoxelCoord};

use crate::core::{DepthFrame, FrameSize, Intrinsics, Pose, is_valid_depth, nan_vector};

/// A TSDF volume of either layout.
#[derive(Clone, Debug)]
pub enum Volume {
    /// Dense, bounded voxel grid
    Tsdf(TsdfVolume),
    /// Sparse, unbounded block map
    HashTsdf(HashTsdfVolume),
}

impl Volume {
    /// Create an empty volume of the configured kind.
    pub fn new(params: &VolumeParams) -> Self {
        match params.kind {
            VolumeKind::Tsdf => Volume::Tsdf(TsdfVolume::new(params)),
            VolumeKind::HashTsdf => Volume::HashTsdf(HashTsdfVolume::new(params)),
        }
    }

    /// Storage layout.
    pub fn kind(&self) -> VolumeKind {
        match self {
            Volume::Tsdf(_) => VolumeKind::Tsdf,
            Volume::HashTsdf(_) => VolumeKind::HashTsdf,
        }
    }

    /// Volume parameters.
    pub fn params(&self) -> &VolumeParams {
        match self {
            Volume::Tsdf(v) => v.params(),
            Volume::HashTsdf(v) => v.params(),
        }
    }

    /// Volume pose in the submap frame.
    pub fn pose(&self) -> &Pose {
        match self {
            Volume::Tsdf(v) => v.pose(),
            Volume::HashTsdf(v) => v.pose(),
        }
    }

    /// Fuse a depth frame seen from `camera_pose` (submap frame).
    pub fn integrate(&mut self, depth: &DepthFrame, camera_pose: &Pose, intrinsics: &Intrinsics) {
        match self {
            Volume::Tsdf(v) => v.integrate(depth, camera_pose, intrinsics),
            Volume::HashTsdf(v) => v.integrate(depth, camera_pose, intrinsics),
        }
    }

    /// Render points and normals seen from `camera_pose` (submap frame).
    pub fn raycast(&self, camera_pose: &Pose, intrinsics: &Intrinsics, size: FrameSize) -> RaycastResult {
        match self {
            Volume::Tsdf(v) => v.raycast(camera_pose, intrinsics, size),
            Volume::HashTsdf(v) => v.raycast(camera_pose, intrinsics, size),
        }
    }

    /// Surface points and normals in the submap frame.
    pub fn fetch_points_normals(&self) -> (Vec<Point3<f32>>, Vec<Vector3<f32>>) {
        match self {
            Volume::Tsdf(v) => v.fetch_points_normals(),
            Volume::HashTsdf(v) => v.fetch_points_normals(),
        }
    }

    /// Normals at arbitrary submap-frame points. NaN where there is no data.
    pub fn fetch_normals(&self, points: &[Point3<f32>]) -> Vec<Vector3<f32>> {
        let to_vol = self.pose().inverse();
        let rotation = self.pose().rotation;
        points
            .iter()
            .map(|p| {
                let p_vol = to_vol * p;
                let n = match self {
                    Volume::Tsdf(v) => v.normal_at(&p_vol),
                    Volume::HashTsdf(v) => v.normal_at(&p_vol),
                };
                n.map_or_else(nan_vector, |n| rotation * n)
            })
            .collect()
    }

    /// Update per-unit visibility for the current camera.
    pub fn mark_visible(&mut self, camera_pose: &Pose, intrinsics: &Intrinsics, size: FrameSize, frame_id: u64) {
        match self {
            Volume::Tsdf(v) => v.mark_visible(camera_pose, intrinsics, size, frame_id),
            Volume::HashTsdf(v) => v.mark_visible(camera_pose, intrinsics, size, frame_id),
        }
    }

    /// Fraction of allocated units (or touched bricks) seen within the last
    /// `window` frames. 1.0 for an empty volume.
    pub fn visibility_ratio(&self, frame_id: u64, window: u64) -> f32 {
        match self {
            Volume::Tsdf(v) => v.visibility_ratio(frame_id, window),
            Volume::HashTsdf(v) => v.visibility_ratio(frame_id, window),
        }
    }

    /// Allocated units (hash) or touched bricks (dense).
    pub fn allocated_units(&self) -> usize {
        match self {
            Volume::Tsdf(v) => v.touched_bricks(),
            Volume::HashTsdf(v) => v.allocated_units(),
        }
    }

    /// Clear all fused data.
    pub fn reset(&mut self) {
        match self {
            Volume::Tsdf(v) => v.reset(),
            Volume::HashTsdf(v) => v.reset(),
        }
    }

    /// Memory used by voxel storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        match self {
            Volume::Tsdf(v) => v.memory_bytes(),
            Volume::HashTsdf(v) => v.memory_bytes(),
        }
    }
}

/// Projective TSDF observation for a camera-frame voxel center.
///
/// `None` when the voxel is behind the camera, outside the image, has no
/// usable depth, or lies more than `trunc` behind the observed surface.
#[inline]
pub(crate) fn projective_tsdf(
    p_cam: &Point3<f32>,
    depth: &DepthFrame,
    intrinsics: &Intrinsics,
    trunc: f32,
    depth_trunc: f32,
) -> Option<f32> {
    if p_cam.z <= 0.0 {
        return None;
    }
    let (u, v) = intrinsics.project(p_cam);
    let d = *depth.get(u.round() as i64, v.round() as i64)?;
    if !is_valid_depth(d) || (depth_trunc > 0.0 && d > depth_trunc) {
        return None;
    }
    let sdf = d - p_cam.z;
    if sdf < -trunc {
        return None;
    }
    Some((sdf / trunc).min(1.0))
}

/// Is a camera-frame point inside the viewing frustum?
#[inline]
pub(crate) fn in_frustum(p_cam: &Point3<f32>, intrinsics: &Intrinsics, size: FrameSize, max_depth: f32) -> bool {
    if p_cam.z <= 0.0 || p_cam.z > max_depth {
        return false;
    }
    let (u, v) = intrinsics.project(p_cam);
    u >= -0.5 && v >= -0.5 && u < size.width as f32 - 0.5 && v < size.height as f32 - 0.5
}
