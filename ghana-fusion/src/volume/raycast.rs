//! Ray marching through a TSDF.
//!
//! ```text
//!  camera ●───·───·───·───·──·──✕──·   (samples every step)
//!                          +0.6 +0.2 -0.3
//!                                 ▲
//!                    zero crossing, linearly interpolated
//! ```
//!
//! Only positive-to-negative crossings are surfaces. A negative sample
//! without a preceding positive one means the ray started behind a surface
//! and is reported as a miss.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::voxel::TsdfSource;
use crate::core::{FrameSize, Image, Intrinsics, NormalMap, PointMap, Pose, nan_point, nan_vector};

/// Raycast output in the camera frame of the rendering pose.
#[derive(Clone, Debug)]
pub struct RaycastResult {
    /// Surface points (NaN where the ray missed)
    pub points: PointMap,
    /// Unit normals facing the camera (NaN where the ray missed)
    pub normals: NormalMap,
}

impl RaycastResult {
    /// A result with no hits.
    pub fn empty(size: FrameSize) -> Self {
        Self {
            points: Image::filled(size.width, size.height, nan_point()),
            normals: Image::filled(size.width, size.height, nan_vector()),
        }
    }

    /// Number of pixels with a surface hit.
    pub fn hit_count(&self) -> usize {
        self.points
            .data()
            .iter()
            .filter(|p| p.x.is_finite())
            .count()
    }
}

/// Where a ray is allowed to travel, in the volume frame.
#[derive(Clone, Copy, Debug)]
pub(crate) enum RayBounds {
    /// Axis-aligned box `[min, max]`.
    Box {
        min: Vector3<f32>,
        max: Vector3<f32>,
    },
    /// Anything up to this distance from the camera.
    Distance(f32),
}

impl RayBounds {
    /// Parametric interval `[t_near, t_far]` of the ray inside the bounds.
    fn clip(&self, origin: &Point3<f32>, dir: &Vector3<f32>) -> Option<(f32, f32)> {
        match self {
            RayBounds::Distance(max) => Some((0.0, *max)),
            RayBounds::Box { min, max } => {
                let mut t_near = 0.0f32;
                let mut t_far = f32::INFINITY;
                for axis in 0..3 {
                    let o = origin[axis];
                    let d = dir[axis];
                    if d.abs() < 1e-9 {
                        if o < min[axis] || o > max[axis] {
                            return None;
                        }
                        continue;
                    }
                    let t1 = (min[axis] - o) / d;
                    let t2 = (max[axis] - o) / d;
                    t_near = t_near.max(t1.min(t2));
                    t_far = t_far.min(t1.max(t2));
                }
                (t_near <= t_far).then_some((t_near, t_far))
            }
        }
    }
}

/// Raycast a TSDF from `cam_in_vol` (camera pose in the volume frame).
pub(crate) fn raycast<S: TsdfSource>(
    source: &S,
    cam_in_vol: &Pose,
    intrinsics: &Intrinsics,
    size: FrameSize,
    step: f32,
    bounds: RayBounds,
) -> RaycastResult {
    let mut result = RaycastResult::empty(size);
    if size.width == 0 {
        return result;
    }

    let origin = Point3::from(cam_in_vol.translation.vector);
    let vol_to_cam = cam_in_vol.inverse();

    result
        .points
        .data_mut()
        .par_chunks_mut(size.width)
        .zip(result.normals.data_mut().par_chunks_mut(size.width))
        .enumerate()
        .for_each(|(y, (prow, nrow))| {
            for x in 0..size.width {
                let dir = cam_in_vol.rotation * intrinsics.ray_direction(x as f32, y as f32);
                if let Some((p, n)) = march(source, &origin, &dir, step, &bounds) {
                    prow[x] = vol_to_cam * p;
                    nrow[x] = vol_to_cam.rotation * n;
                }
            }
        });
    result
}

/// March a single ray and return the first front-facing surface hit.
fn march<S: TsdfSource>(
    source: &S,
    origin: &Point3<f32>,
    dir: &Vector3<f32>,
    step: f32,
    bounds: &RayBounds,
) -> Option<(Point3<f32>, Vector3<f32>)> {
    let (t_near, t_far) = bounds.clip(origin, dir)?;
    let skip = source.voxel_size();

    let mut t = t_near;
    let mut prev: Option<(f32, f32)> = None;
    while t <= t_far {
        let p = origin + dir * t;
        let Some(f) = source.interpolate(&p) else {
            prev = None;
            t += skip;
            continue;
        };

        match prev {
            Some((t_prev, f_prev)) if f_prev > 0.0 && f <= 0.0 => {
                let t_hit = t_prev + (t - t_prev) * f_prev / (f_prev - f);
                let hit = origin + dir * t_hit;
                return source.normal_at(&hit).map(|n| (hit, n));
            }
            _ if f < 0.0 => return None,
            _ => {}
        }

        prev = Some((t, f));
        t += step;
    }
    None
}
