//! Volume configuration.

use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::Pose;

/// Storage layout of a TSDF volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    /// Single dense voxel grid with fixed bounds.
    Tsdf,
    /// Lazily allocated blocks keyed by block coordinate, unbounded.
    HashTsdf,
}

/// Configuration of a single TSDF volume.
///
/// The dense volume spans `resolution · voxel_size` meters per axis starting
/// at `origin` in its submap frame. The hashed volume ignores `resolution`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParams {
    /// Storage layout.
    /// Default: hash_tsdf
    pub kind: VolumeKind,

    /// Number of voxels along x, y, z (dense volume only).
    /// Default: [512, 512, 512]
    pub resolution: [usize; 3],

    /// Voxels per block edge. Allocation unit of the hashed volume,
    /// visibility brick size of the dense volume.
    /// Default: 16
    pub unit_resolution: usize,

    /// Nominal volume size in meters, used to place the default origin.
    /// Default: 3.0
    pub volume_size: f32,

    /// Volume origin in the submap frame (meters).
    /// Default: [-1.5, -1.5, 0.5], so the volume sits in front of the camera
    pub origin: [f32; 3],

    /// Voxel edge length in meters.
    /// Default: 3.0 / 512
    pub voxel_size: f32,

    /// TSDF truncation distance in meters.
    /// Default: 7 · voxel_size
    pub tsdf_trunc_dist: f32,

    /// Maximum fused observations per voxel.
    /// Default: 64
    pub max_weight: u16,

    /// Depth samples beyond this many meters are ignored (0 disables).
    /// Default: 4.0 for hash_tsdf, 0.0 for tsdf
    pub depth_trunc_threshold: f32,

    /// Raycast step as a fraction of the voxel size.
    /// Default: 0.25
    pub raycast_step_factor: f32,

    /// Longest ray marched through an unbounded (hashed) volume, in meters.
    /// Default: 4.0
    pub max_ray_distance: f32,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self::default_params(VolumeKind::HashTsdf)
    }
}

impl VolumeParams {
    /// High quality parameters at the cost of speed and memory.
    pub fn default_params(kind: VolumeKind) -> Self {
        let volume_size = 3.0;
        let voxel_size = volume_size / 512.0;
        Self {
            kind,
            resolution: [512; 3],
            unit_resolution: 16,
            volume_size,
            origin: [-volume_size / 2.0, -volume_size / 2.0, 0.5],
            voxel_size,
            tsdf_trunc_dist: 7.0 * voxel_size,
            max_weight: 64,
            depth_trunc_threshold: match kind {
                VolumeKind::Tsdf => 0.0,
                VolumeKind::HashTsdf => 4.0,
            },
            raycast_step_factor: 0.25,
            max_ray_distance: 4.0,
        }
    }

    /// Faster, lower resolution parameters.
    pub fn coarse_params(kind: VolumeKind) -> Self {
        let volume_size = 3.0;
        let voxel_size = volume_size / 128.0;
        Self {
            resolution: [128; 3],
            unit_resolution: 8,
            voxel_size,
            tsdf_trunc_dist: 2.0 * voxel_size,
            raycast_step_factor: 0.75,
            ..Self::default_params(kind)
        }
    }

    /// Volume pose in its submap frame.
    pub fn pose(&self) -> Pose {
        Pose::from_parts(
            Translation3::new(self.origin[0], self.origin[1], self.origin[2]),
            UnitQuaternion::identity(),
        )
    }

    /// Raycast step length in meters.
    #[inline]
    pub fn raycast_step(&self) -> f32 {
        self.raycast_step_factor * self.voxel_size
    }

    /// Block edge length in meters.
    #[inline]
    pub fn unit_size(&self) -> f32 {
        self.unit_resolution as f32 * self.voxel_size
    }

    /// Physical extent of the dense volume in meters.
    pub fn extent(&self) -> [f32; 3] {
        self.resolution.map(|r| r as f32 * self.voxel_size)
    }

    /// Farthest depth considered for visibility and raycasting.
    pub fn max_depth(&self) -> f32 {
        if self.depth_trunc_threshold > 0.0 {
            self.depth_trunc_threshold
        } else {
            self.max_ray_distance
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.voxel_size > 0.0 && self.voxel_size.is_finite()) {
            return Err(ConfigError::InvalidValue(
                "voxel_size must be > 0".to_string(),
            ));
        }

        if !(self.tsdf_trunc_dist >= self.voxel_size && self.tsdf_trunc_dist.is_finite()) {
            return Err(ConfigError::InvalidValue(format!(
                "tsdf_trunc_dist ({:.4}m) must be at least one voxel ({:.4}m)",
                self.tsdf_trunc_dist, self.voxel_size
            )));
        }

        if self.max_weight == 0 {
            return Err(ConfigError::InvalidValue(
                "max_weight must be > 0".to_string(),
            ));
        }

        if !(self.raycast_step_factor > 0.0 && self.raycast_step_factor <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "raycast_step_factor must be in (0, 1]".to_string(),
            ));
        }

        if self.unit_resolution == 0 {
            return Err(ConfigError::InvalidValue(
                "unit_resolution must be > 0".to_string(),
            ));
        }

        if !(self.depth_trunc_threshold >= 0.0 && self.max_ray_distance > 0.0) {
            return Err(ConfigError::InvalidValue(
                "depth_trunc_threshold must be >= 0 and max_ray_distance > 0".to_string(),
            ));
        }

        if self.kind == VolumeKind::Tsdf && self.resolution.iter().any(|&r| r == 0) {
            return Err(ConfigError::InvalidValue(
                "dense volume resolution must be > 0 on every axis".to_string(),
            ));
        }

        Ok(())
    }

    /// Approximate memory of a fully allocated dense volume in bytes.
    pub fn dense_memory_bytes(&self) -> usize {
        self.resolution.iter().product::<usize>() * std::mem::size_of::<super::TsdfVoxel>()
    }
}
