//! Dense TSDF volume.
//!
//! Voxels are stored x-major (`(x · ny + y) · nz + z`) so each x-slab is a
//! contiguous chunk that rayon can integrate independently.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::config::VolumeParams;
use super::raycast::{RayBounds, RaycastResult, raycast};
use super::surface::extract_surface;
use super::voxel::{TsdfSource, TsdfVoxel, VoxelCoord};
use super::{in_frustum, projective_tsdf};
use crate::core::{DepthFrame, FrameSize, Intrinsics, Pose};

/// Per-brick bookkeeping for visibility statistics.
#[derive(Clone, Debug)]
struct BrickGrid {
    dims: [usize; 3],
    touched: Vec<bool>,
    last_visible: Vec<Option<u64>>,
}

impl BrickGrid {
    fn new(dims: [usize; 3]) -> Self {
        let n = dims.iter().product();
        Self {
            dims,
            touched: vec![false; n],
            last_visible: vec![None; n],
        }
    }

    #[inline]
    fn index(&self, b: [usize; 3]) -> usize {
        (b[0] * self.dims[1] + b[1]) * self.dims[2] + b[2]
    }

    fn clear(&mut self) {
        self.touched.fill(false);
        self.last_visible.fill(None);
    }
}

/// Fixed-size voxel grid.
#[derive(Clone, Debug)]
pub struct TsdfVolume {
    params: VolumeParams,
    pose: Pose,
    dims: [usize; 3],
    voxels: Vec<TsdfVoxel>,
    bricks: BrickGrid,
}

impl TsdfVolume {
    /// Allocate a dense volume. All voxels start unobserved.
    pub fn new(params: &VolumeParams) -> Self {
        let dims = params.resolution;
        let unit = params.unit_resolution.max(1);
        let brick_dims = dims.map(|d| d.div_ceil(unit));
        Self {
            params: params.clone(),
            pose: params.pose(),
            dims,
            voxels: vec![TsdfVoxel::default(); dims.iter().product()],
            bricks: BrickGrid::new(brick_dims),
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

    /// Grid dimensions in voxels.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.dims[1] + y) * self.dims[2] + z
    }

    /// Raw voxel at `(x, y, z)`, including unobserved ones.
    pub fn voxel_at(&self, x: usize, y: usize, z: usize) -> Option<&TsdfVoxel> {
        if x >= self.dims[0] || y >= self.dims[1] || z >= self.dims[2] {
            return None;
        }
        self.voxels.get(self.index(x, y, z))
    }

    /// All voxels in storage order.
    pub fn voxels(&self) -> &[TsdfVoxel] {
        &self.voxels
    }

    /// Fuse a depth frame seen from `camera_pose` (submap frame).
    pub fn integrate(&mut self, depth: &DepthFrame, camera_pose: &Pose, intrinsics: &Intrinsics) {
        let cam_from_vol = camera_pose.inverse() * self.pose;
        let [_, ny, nz] = self.dims;
        if ny == 0 || nz == 0 {
            return;
        }
        let voxel_size = self.params.voxel_size;
        let trunc = self.params.tsdf_trunc_dist;
        let max_weight = self.params.max_weight;
        let depth_trunc = self.params.depth_trunc_threshold;
        let unit = self.params.unit_resolution.max(1);
        let brick_dims = self.bricks.dims;

        let slab_touches: Vec<(usize, Vec<bool>)> = self
            .voxels
            .par_chunks_mut(ny * nz)
            .enumerate()
            .map(|(x, slab)| {
                let mut touched = vec![false; brick_dims[1] * brick_dims[2]];
                for y in 0..ny {
                    for z in 0..nz {
                        let center = VoxelCoord::new(x as i32, y as i32, z as i32).center(voxel_size);
                        let p_cam = cam_from_vol * center;
                        let Some(value) =
                            projective_tsdf(&p_cam, depth, intrinsics, trunc, depth_trunc)
                        else {
                            continue;
                        };
                        slab[y * nz + z].fuse(value, max_weight);
                        touched[(y / unit) * brick_dims[2] + z / unit] = true;
                    }
                }
                (x / unit, touched)
            })
            .collect();

        for (bx, touched) in slab_touches {
            for (i, _) in touched.iter().enumerate().filter(|(_, t)| **t) {
                let idx = self.bricks.index([bx, i / brick_dims[2], i % brick_dims[2]]);
                self.bricks.touched[idx] = true;
            }
        }
    }

    /// Raycast from `camera_pose` (submap frame). Output is in the camera frame.
    pub fn raycast(&self, camera_pose: &Pose, intrinsics: &Intrinsics, size: FrameSize) -> RaycastResult {
        let cam_in_vol = self.pose.inverse() * camera_pose;
        let extent = self.params.extent();
        let bounds = RayBounds::Box {
            min: Vector3::zeros(),
            max: Vector3::new(extent[0], extent[1], extent[2]),
        };
        raycast(self, &cam_in_vol, intrinsics, size, self.params.raycast_step(), bounds)
    }

    /// Surface points and normals in the submap frame.
    pub fn fetch_points_normals(&self) -> (Vec<Point3<f32>>, Vec<Vector3<f32>>) {
        let [nx, ny, nz] = self.dims.map(|d| d as i32);
        let coords = (0..nx).into_par_iter().flat_map_iter(move |x| {
            (0..ny).flat_map(move |y| (0..nz).map(move |z| VoxelCoord::new(x, y, z)))
        });
        let (points, normals) = extract_surface(self, coords);
        (
            points.into_iter().map(|p| self.pose * p).collect(),
            normals.into_iter().map(|n| self.pose.rotation * n).collect(),
        )
    }

    /// Stamp every touched brick inside the camera frustum with `frame_id`.
    pub fn mark_visible(
        &mut self,
        camera_pose: &Pose,
        intrinsics: &Intrinsics,
        size: FrameSize,
        frame_id: u64,
    ) {
        let cam_from_vol = camera_pose.inverse() * self.pose;
        let brick_size = self.params.unit_size();
        let max_depth = self.params.max_depth();
        let [bx, by, bz] = self.bricks.dims;
        for x in 0..bx {
            for y in 0..by {
                for z in 0..bz {
                    let idx = self.bricks.index([x, y, z]);
                    if !self.bricks.touched[idx] {
                        continue;
                    }
                    let center = Point3::new(
                        (x as f32 + 0.5) * brick_size,
                        (y as f32 + 0.5) * brick_size,
                        (z as f32 + 0.5) * brick_size,
                    );
                    if in_frustum(&(cam_from_vol * center), intrinsics, size, max_depth) {
                        self.bricks.last_visible[idx] = Some(frame_id);
                    }
                }
            }
        }
    }

    /// Fraction of touched bricks seen within the last `window` frames.
    pub fn visibility_ratio(&self, frame_id: u64, window: u64) -> f32 {
        let mut touched = 0usize;
        let mut visible = 0usize;
        for (t, last) in self.bricks.touched.iter().zip(&self.bricks.last_visible) {
            if !*t {
                continue;
            }
            touched += 1;
            if last.is_some_and(|f| f.saturating_add(window) > frame_id) {
                visible += 1;
            }
        }
        if touched == 0 {
            return 1.0;
        }
        visible as f32 / touched as f32
    }

    /// Number of bricks that received at least one observation.
    pub fn touched_bricks(&self) -> usize {
        self.bricks.touched.iter().filter(|&&t| t).count()
    }

    /// Clear all voxels and visibility state.
    pub fn reset(&mut self) {
        self.voxels.fill(TsdfVoxel::default());
        self.bricks.clear();
    }

    /// Memory used by voxel storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.voxels.len() * std::mem::size_of::<TsdfVoxel>()
    }
}

impl TsdfSource for TsdfVolume {
    fn voxel_size(&self) -> f32 {
        self.params.voxel_size
    }

    fn voxel(&self, c: VoxelCoord) -> Option<TsdfVoxel> {
        if c.x < 0 || c.y < 0 || c.z < 0 {
            return None;
        }
        self.voxel_at(c.x as usize, c.y as usize, c.z as usize)
            .copied()
            .filter(TsdfVoxel::is_observed)
    }
}
