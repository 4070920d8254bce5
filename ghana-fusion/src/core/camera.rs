//! Pinhole camera model.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Frame size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

impl FrameSize {
    /// Create a new frame size.
    #[inline]
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Size of pyramid level `level` (each level halves both dimensions).
    #[inline]
    pub fn at_level(&self, level: usize) -> Self {
        let halve = |n: usize| {
            u32::try_from(level)
                .ok()
                .and_then(|shift| n.checked_shr(shift))
                .unwrap_or(0)
        };
        Self::new(halve(self.width), halve(self.height))
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Depth camera intrinsics.
///
/// Pixel centers sit at integer coordinates, so the principal point of a
/// centered 640×480 sensor is `(319.5, 239.5)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Focal length along x (pixels)
    pub fx: f32,
    /// Focal length along y (pixels)
    pub fy: f32,
    /// Principal point x (pixels)
    pub cx: f32,
    /// Principal point y (pixels)
    pub cy: f32,
}

impl Intrinsics {
    /// Create intrinsics from focal lengths and principal point.
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Centered principal point with a common focal length.
    pub fn centered(size: FrameSize, focal: f32) -> Self {
        Self::new(
            focal,
            focal,
            size.width as f32 / 2.0 - 0.5,
            size.height as f32 / 2.0 - 0.5,
        )
    }

    /// Intrinsics of pyramid level `level`.
    pub fn scaled(&self, level: usize) -> Self {
        let s = 0.5f32.powi(i32::try_from(level).unwrap_or(i32::MAX));
        Self::new(
            self.fx * s,
            self.fy * s,
            (self.cx + 0.5) * s - 0.5,
            (self.cy + 0.5) * s - 0.5,
        )
    }

    /// Project a camera-frame point to continuous pixel coordinates.
    ///
    /// The caller must check `p.z > 0`.
    #[inline]
    pub fn project(&self, p: &Point3<f32>) -> (f32, f32) {
        (
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        )
    }

    /// Back-project pixel `(u, v)` with depth `z` into the camera frame.
    #[inline]
    pub fn reproject(&self, u: f32, v: f32, z: f32) -> Point3<f32> {
        Point3::new((u - self.cx) * z / self.fx, (v - self.cy) * z / self.fy, z)
    }

    /// Unit-length viewing ray through pixel `(u, v)`.
    #[inline]
    pub fn ray_direction(&self, u: f32, v: f32) -> Vector3<f32> {
        Vector3::new((u - self.cx) / self.fx, (v - self.cy) / self.fy, 1.0).normalize()
    }
}

impl Default for Intrinsics {
    fn default() -> Self {
        Self::centered(FrameSize::default(), 525.0)
    }
}
