//! Spatially hashed TSDF volume.
//!
//! ```text
//!   block coord ──► HashMap ──► slot ──► arena: Vec<VolumeUnit>
//!   (-1, 0, 3)                   17       [u0][u1]...[u17]...
//! ```
//!
//! Units are allocated on first contact with the truncation band and never
//! move or shrink. The arena is append-only; [`HashTsdfVolume::reset`] is the
//! only way to release units.

use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::config::VolumeParams;
use super::raycast::{RayBounds, RaycastResult, raycast};
use super::surface::extract_surface;
use super::voxel::{TsdfSource, TsdfVoxel, VoxelCoord};
use super::{in_frustum, projective_tsdf};
use crate::core::{DepthFrame, FrameSize, Intrinsics, Pose, is_valid_depth};

/// Integer block coordinate (block `b` spans voxels `b·n .. (b+1)·n`).
pub type BlockCoord = VoxelCoord;

/// Fixed cube of `n³` voxels.
#[derive(Clone, Debug)]
pub struct VolumeUnit {
    coord: BlockCoord,
    voxels: Box<[TsdfVoxel]>,
    last_visible: Option<u64>,
}

impl VolumeUnit {
    fn new(coord: BlockCoord, resolution: usize) -> Self {
        Self {
            coord,
            voxels: vec![TsdfVoxel::default(); resolution.pow(3)].into_boxed_slice(),
            last_visible: None,
        }
    }

    /// Block coordinate, stable for the unit's lifetime.
    #[inline]
    pub fn coord(&self) -> BlockCoord {
        self.coord
    }

    /// Voxels in `(x · n + y) · n + z` order.
    #[inline]
    pub fn voxels(&self) -> &[TsdfVoxel] {
        &self.voxels
    }

    /// Frame index at which the unit was last inside the camera frustum.
    #[inline]
    pub fn last_visible(&self) -> Option<u64> {
        self.last_visible
    }
}

/// Unbounded TSDF made of lazily allocated [`VolumeUnit`]s.
#[derive(Clone, Debug)]
pub struct HashTsdfVolume {
    params: VolumeParams,
    pose: Pose,
    units: Vec<VolumeUnit>,
    index: HashMap<BlockCoord, usize>,
}

impl HashTsdfVolume {
    /// Create an empty volume.
    pub fn new(params: &VolumeParams) -> Self {
        Self {
            params: params.clone(),
            pose: params.pose(),
            units: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Volume parameters.
    pub fn params(&self) -> &VolumeParams {
        &self.params
    }

    /// Volume pose in the submap frame.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Allocated units in allocation order.
    pub fn units(&self) -> &[VolumeUnit] {
        &self.units
    }

    /// Unit at a block coordinate.
    pub fn unit(&self, coord: BlockCoord) -> Option<&VolumeUnit> {
        self.index.get(&coord).map(|&slot| &self.units[slot])
    }

    /// Number of allocated units.
    pub fn allocated_units(&self) -> usize {
        self.units.len()
    }

    #[inline]
    fn resolution(&self) -> usize {
        self.params.unit_resolution
    }

    /// Volume-frame center of a unit.
    fn unit_center(&self, coord: BlockCoord) -> Point3<f32> {
        coord.center(self.params.unit_size())
    }

    /// Blocks touched by the truncation band of every valid depth sample.
    fn touched_blocks(
        &self,
        depth: &DepthFrame,
        cam_in_vol: &Pose,
        intrinsics: &Intrinsics,
    ) -> HashSet<BlockCoord> {
        let trunc = self.params.tsdf_trunc_dist;
        let depth_trunc = self.params.depth_trunc_threshold;
        let unit_size = self.params.unit_size();
        let step = (unit_size / 2.0).min(trunc);
        let width = depth.width();

        (0..depth.height())
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).flat_map(move |x| {
                    let d = *depth.at(x, y);
                    let usable = is_valid_depth(d) && (depth_trunc <= 0.0 || d <= depth_trunc);
                    let samples = if usable {
                        ((2.0 * trunc) / step).ceil() as usize + 1
                    } else {
                        0
                    };
                    (0..samples).filter_map(move |i| {
                        let z = d - trunc + i as f32 * step;
                        if z <= 0.0 {
                            return None;
                        }
                        let p = cam_in_vol * intrinsics.reproject(x as f32, y as f32, z.min(d + trunc));
                        Some(VoxelCoord::containing(&p, unit_size))
                    })
                })
            })
            .collect()
    }

    /// Fuse a depth frame seen from `camera_pose` (submap frame).
    pub fn integrate(&mut self, depth: &DepthFrame, camera_pose: &Pose, intrinsics: &Intrinsics) {
        let cam_in_vol = self.pose.inverse() * camera_pose;
        let touched = self.touched_blocks(depth, &cam_in_vol, intrinsics);

        let mut fresh: Vec<BlockCoord> = touched
            .iter()
            .filter(|c| !self.index.contains_key(*c))
            .copied()
            .collect();
        fresh.sort_unstable();
        let n = self.resolution();
        for coord in fresh {
            self.index.insert(coord, self.units.len());
            self.units.push(VolumeUnit::new(coord, n));
        }

        let cam_from_vol = cam_in_vol.inverse();
        let size = depth.size();
        let max_depth = self.params.max_depth() + self.params.tsdf_trunc_dist;
        let active: Vec<bool> = self
            .units
            .iter()
            .map(|u| {
                touched.contains(&u.coord)
                    || in_frustum(&(cam_from_vol * self.unit_center(u.coord)), intrinsics, size, max_depth)
            })
            .collect();

        let voxel_size = self.params.voxel_size;
        let trunc = self.params.tsdf_trunc_dist;
        let max_weight = self.params.max_weight;
        let depth_trunc = self.params.depth_trunc_threshold;
        self.units
            .par_iter_mut()
            .zip(active.par_iter())
            .filter(|(_, on)| **on)
            .for_each(|(unit, _)| {
                let base = VoxelCoord::new(
                    unit.coord.x * n as i32,
                    unit.coord.y * n as i32,
                    unit.coord.z * n as i32,
                );
                for (i, voxel) in unit.voxels.iter_mut().enumerate() {
                    let local = VoxelCoord::new((i / (n * n)) as i32, ((i / n) % n) as i32, (i % n) as i32);
                    let center = base.offset(local.x, local.y, local.z).center(voxel_size);
                    let p_cam = cam_from_vol * center;
                    if let Some(value) = projective_tsdf(&p_cam, depth, intrinsics, trunc, depth_trunc) {
                        voxel.fuse(value, max_weight);
                    }
                }
            });
    }

    /// Raycast from `camera_pose` (submap frame). Output is in the camera frame.
    pub fn raycast(&self, camera_pose: &Pose, intrinsics: &Intrinsics, size: FrameSize) -> RaycastResult {
        if self.units.is_empty() {
            return RaycastResult::empty(size);
        }
        let cam_in_vol = self.pose.inverse() * camera_pose;
        let bounds = RayBounds::Distance(self.params.max_depth() + self.params.tsdf_trunc_dist);
        raycast(self, &cam_in_vol, intrinsics, size, self.params.raycast_step(), bounds)
    }

    /// Surface points and normals in the submap frame.
    pub fn fetch_points_normals(&self) -> (Vec<Point3<f32>>, Vec<Vector3<f32>>) {
        let n = self.resolution() as i32;
        let coords = self.units.par_iter().flat_map_iter(move |unit| {
            let base = unit.coord;
            (0..n).flat_map(move |x| {
                (0..n).flat_map(move |y| {
                    (0..n).map(move |z| VoxelCoord::new(base.x * n + x, base.y * n + y, base.z * n + z))
                })
            })
        });
        let (points, normals) = extract_surface(self, coords);
        (
            points.into_iter().map(|p| self.pose * p).collect(),
            normals.into_iter().map(|v| self.pose.rotation * v).collect(),
        )
    }

    /// Stamp every unit inside the camera frustum with `frame_id`.
    pub fn mark_visible(
        &mut self,
        camera_pose: &Pose,
        intrinsics: &Intrinsics,
        size: FrameSize,
        frame_id: u64,
    ) {
        let cam_from_vol = camera_pose.inverse() * self.pose;
        let unit_size = self.params.unit_size();
        let max_depth = self.params.max_depth();
        self.units.par_iter_mut().for_each(|unit| {
            let center = unit.coord.center(unit_size);
            if in_frustum(&(cam_from_vol * center), intrinsics, size, max_depth) {
                unit.last_visible = Some(frame_id);
            }
        });
    }

    /// Fraction of allocated units seen within the last `window` frames.
    pub fn visibility_ratio(&self, frame_id: u64, window: u64) -> f32 {
        if self.units.is_empty() {
            return 1.0;
        }
        let visible = self
            .units
            .iter()
            .filter(|u| u.last_visible.is_some_and(|f| f.saturating_add(window) > frame_id))
            .count();
        visible as f32 / self.units.len() as f32
    }

    /// Release every unit.
    pub fn reset(&mut self) {
        self.units.clear();
        self.index.clear();
    }

    /// Memory used by allocated units in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.units.len() * (self.resolution().pow(3) * std::mem::size_of::<TsdfVoxel>() + std::mem::size_of::<VolumeUnit>())
    }
}

impl TsdfSource for HashTsdfVolume {
    fn voxel_size(&self) -> f32 {
        self.params.voxel_size
    }

    fn voxel(&self, c: VoxelCoord) -> Option<TsdfVoxel> {
        let n = self.resolution() as i32;
        let block = VoxelCoord::new(c.x.div_euclid(n), c.y.div_euclid(n), c.z.div_euclid(n));
        let unit = self.unit(block)?;
        let (lx, ly, lz) = (c.x.rem_euclid(n), c.y.rem_euclid(n), c.z.rem_euclid(n));
        let idx = ((lx * n + ly) * n + lz) as usize;
        unit.voxels.get(idx).copied().filter(TsdfVoxel::is_observed)
    }
}
