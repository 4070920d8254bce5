//! Voxel type and TSDF sampling shared by both storage layouts.

use nalgebra::{Point3, Vector3};

/// Integer voxel index in the volume frame.
///
/// Voxel `i` covers `[i, i + 1) · voxel_size` along each axis, so its center
/// sits at `(i + 0.5) · voxel_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelCoord {
    /// X index
    pub x: i32,
    /// Y index
    pub y: i32,
    /// Z index
    pub z: i32,
}

impl VoxelCoord {
    /// Create a new voxel coordinate.
    #[inline]
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Voxel containing a volume-frame point.
    #[inline]
    pub fn containing(p: &Point3<f32>, voxel_size: f32) -> Self {
        Self::new(
            (p.x / voxel_size).floor() as i32,
            (p.y / voxel_size).floor() as i32,
            (p.z / voxel_size).floor() as i32,
        )
    }

    /// Volume-frame center of this voxel.
    #[inline]
    pub fn center(&self, voxel_size: f32) -> Point3<f32> {
        Point3::new(
            (self.x as f32 + 0.5) * voxel_size,
            (self.y as f32 + 0.5) * voxel_size,
            (self.z as f32 + 0.5) * voxel_size,
        )
    }

    /// Component-wise offset.
    #[inline]
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// A single TSDF sample.
///
/// `tsdf` is the signed distance divided by the truncation distance, clamped
/// to `[-1, 1]`: positive in front of the surface, negative behind it.
/// `weight == 0` means the voxel has never been observed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TsdfVoxel {
    /// Normalized truncated signed distance
    pub tsdf: f32,
    /// Number of fused observations, capped at `max_weight`
    pub weight: u16,
}

impl Default for TsdfVoxel {
    fn default() -> Self {
        Self {
            tsdf: 1.0,
            weight: 0,
        }
    }
}

impl TsdfVoxel {
    /// Has this voxel been observed at least once?
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0
    }

    /// Fuse one observation with the running weighted average.
    ///
    /// `tsdf' = (tsdf·w + value) / (w + 1)`, `w' = min(w + 1, max_weight)`.
    #[inline]
    pub fn fuse(&mut self, value: f32, max_weight: u16) {
        let w = self.weight as f32;
        self.tsdf = ((self.tsdf * w + value) / (w + 1.0)).clamp(-1.0, 1.0);
        self.weight = self.weight.saturating_add(1).min(max_weight);
    }
}

/// Read access to fused TSDF data, independent of the storage layout.
///
/// All points are in the volume frame, in meters.
pub trait TsdfSource: Sync {
    /// Edge length of a voxel in meters.
    fn voxel_size(&self) -> f32;

    /// Observed voxel at `coord`, or `None` when unallocated, out of bounds
    /// or never observed.
    fn voxel(&self, coord: VoxelCoord) -> Option<TsdfVoxel>;

    /// Trilinear TSDF interpolation. `None` unless all eight neighbors are observed.
    fn interpolate(&self, p: &Point3<f32>) -> Option<f32> {
        let vs = self.voxel_size();
        let cx = p.x / vs - 0.5;
        let cy = p.y / vs - 0.5;
        let cz = p.z / vs - 0.5;
        let base = VoxelCoord::new(cx.floor() as i32, cy.floor() as i32, cz.floor() as i32);
        let fx = cx - base.x as f32;
        let fy = cy - base.y as f32;
        let fz = cz - base.z as f32;

        let mut corners = [0.0f32; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let dx = (i & 1) as i32;
            let dy = ((i >> 1) & 1) as i32;
            let dz = ((i >> 2) & 1) as i32;
            *corner = self.voxel(base.offset(dx, dy, dz))?.tsdf;
        }

        let x00 = corners[0] + (corners[1] - corners[0]) * fx;
        let x10 = corners[2] + (corners[3] - corners[2]) * fx;
        let x01 = corners[4] + (corners[5] - corners[4]) * fx;
        let x11 = corners[6] + (corners[7] - corners[6]) * fx;
        let y0 = x00 + (x10 - x00) * fy;
        let y1 = x01 + (x11 - x01) * fy;
        Some(y0 + (y1 - y0) * fz)
    }

    /// TSDF gradient by central differences, one voxel apart.
    fn gradient(&self, p: &Point3<f32>) -> Option<Vector3<f32>> {
        let h = self.voxel_size();
        let mut g = Vector3::zeros();
        for axis in 0..3 {
            let mut offset = Vector3::zeros();
            offset[axis] = h;
            let fwd = self.interpolate(&(p + offset))?;
            let bwd = self.interpolate(&(p - offset))?;
            g[axis] = (fwd - bwd) / (2.0 * h);
        }
        Some(g)
    }

    /// Unit surface normal at `p`, pointing toward free space.
    fn normal_at(&self, p: &Point3<f32>) -> Option<Vector3<f32>> {
        let g = self.gradient(p)?;
        let len = g.norm();
        if len <= f32::EPSILON || !len.is_finite() {
            return None;
        }
        Some(g / len)
    }
}
