//! Test utilities for GhanaFusion.
//!
//! Synthetic depth frames of a furnished box room, rendered analytically
//! from arbitrary camera poses, plus camera trajectories through it.

#![allow(dead_code)]

use ghana_fusion::{
    DepthFrame, FrameSize, Image, Intrinsics, Params, Pose, VolumeKind, VolumeParams,
};
use nalgebra::{Point3, Vector3};

/// Axis-aligned box.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min: Point3::from(min),
            max: Point3::from(max),
        }
    }

    /// Entry distance of a ray hitting the box from outside.
    fn entry(&self, origin: &Point3<f32>, dir: &Vector3<f32>) -> Option<f32> {
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        for axis in 0..3 {
            if dir[axis].abs() < 1e-9 {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - origin[axis]) / dir[axis];
            let t1 = (self.max[axis] - origin[axis]) / dir[axis];
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));
        }
        (t_near <= t_far && t_near > 0.0).then_some(t_near)
    }

    /// Exit distance of a ray starting inside the box.
    fn exit(&self, origin: &Point3<f32>, dir: &Vector3<f32>) -> Option<f32> {
        let mut t_exit = f32::INFINITY;
        for axis in 0..3 {
            if dir[axis] > 1e-9 {
                t_exit = t_exit.min((self.max[axis] - origin[axis]) / dir[axis]);
            } else if dir[axis] < -1e-9 {
                t_exit = t_exit.min((self.min[axis] - origin[axis]) / dir[axis]);
            }
        }
        (t_exit.is_finite() && t_exit > 0.0).then_some(t_exit)
    }
}

/// A room seen from inside, with solid boxes standing in it.
///
/// World frame matches the first camera: x right, y down (floor at +y), z forward.
#[derive(Clone, Debug)]
pub struct Scene {
    pub room: Aabb,
    pub boxes: Vec<Aabb>,
}

impl Scene {
    /// 6m x 2.4m x 5m room with a few boxes against the far wall.
    pub fn room() -> Self {
        Self {
            room: Aabb::new([-3.0, -1.4, -1.0], [3.0, 1.0, 4.0]),
            boxes: vec![
                Aabb::new([-1.2, 0.2, 2.6], [-0.4, 1.0, 3.4]),
                Aabb::new([0.5, -0.3, 3.0], [1.3, 1.0, 3.6]),
                Aabb::new([2.0, 0.4, 1.0], [2.6, 1.0, 1.8]),
                Aabb::new([-2.6, -0.2, 0.5], [-2.0, 1.0, 1.5]),
            ],
        }
    }

    /// Render metric depth (camera z) seen from `pose` (camera to world).
    pub fn render_depth(&self, pose: &Pose, intrinsics: &Intrinsics, size: FrameSize) -> DepthFrame {
        let origin = Point3::from(pose.translation.vector);
        let mut depth = Image::filled(size.width, size.height, 0.0f32);
        for y in 0..size.height {
            for x in 0..size.width {
                // z component of this direction is 1, so the hit distance is the depth
                let ray = Vector3::new(
                    (x as f32 - intrinsics.cx) / intrinsics.fx,
                    (y as f32 - intrinsics.cy) / intrinsics.fy,
                    1.0,
                );
                let dir = pose.rotation * ray;
                let mut t = self.room.exit(&origin, &dir).unwrap_or(0.0);
                for b in &self.boxes {
                    if let Some(hit) = b.entry(&origin, &dir) {
                        t = t.min(hit);
                    }
                }
                *depth.at_mut(x, y) = t;
            }
        }
        depth
    }
}

/// Depth frame of a fronto-parallel wall.
pub fn wall_depth(size: FrameSize, distance: f32) -> DepthFrame {
    Image::filled(size.width, size.height, distance)
}

/// Small, fast parameters for integration tests.
pub fn test_params() -> Params {
    let mut params = Params::hash_tsdf_params(true);
    params.camera.frame_size = FrameSize::new(80, 60);
    params.camera.intrinsics = Intrinsics::centered(params.camera.frame_size, 70.0);
    params.tracking.icp_min_correspondences = 40;
    params.volume = VolumeParams {
        voxel_size: 0.03,
        tsdf_trunc_dist: 0.09,
        unit_resolution: 8,
        max_ray_distance: 6.0,
        depth_trunc_threshold: 6.0,
        ..VolumeParams::coarse_params(VolumeKind::HashTsdf)
    };
    params.preprocess.truncate_threshold = 6.0;
    params
}

/// Camera sliding along +x while looking forward.
pub fn straight_path(n: usize, step: f32) -> Vec<Pose> {
    (0..n)
        .map(|i| Pose::translation(i as f32 * step - 1.5, 0.0, 0.0))
        .collect()
}

/// Camera panning around the vertical axis at a fixed position.
pub fn pan_path(n: usize, step_rad: f32) -> Vec<Pose> {
    (0..n)
        .map(|i| Pose::new(Vector3::zeros(), Vector3::new(0.0, i as f32 * step_rad, 0.0)))
        .collect()
}

/// Translation error between two poses in meters.
pub fn translation_error(a: &Pose, b: &Pose) -> f32 {
    (a.translation.vector - b.translation.vector).norm()
}
