//! Row-major image buffers.
//!
//! Invalid samples are encoded in-band: zero or non-finite depth, NaN points
//! and NaN normals. Everything downstream checks validity per pixel.

use nalgebra::{Point3, Vector3};

use super::camera::FrameSize;
use crate::error::{FusionError, Result};

/// Generic row-major image.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

/// Metric depth image (meters). Zero or non-finite means missing.
pub type DepthFrame = Image<f32>;

/// Camera-frame 3-D points. NaN means missing.
pub type PointMap = Image<Point3<f32>>;

/// Unit surface normals. NaN means missing.
pub type NormalMap = Image<Vector3<f32>>;

impl<T: Clone> Image<T> {
    /// Create an image filled with a single value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing buffer. Fails when the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            return Err(FusionError::BufferLengthMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

impl<T> Image<T> {
    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Frame size.
    #[inline]
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Raw samples in row-major order.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable raw samples in row-major order.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the image and return its buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Sample at `(x, y)`. Panics when out of bounds.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> &T {
        &self.data[y * self.width + x]
    }

    /// Sample at `(x, y)`, or `None` when out of bounds.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<&T> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(&self.data[y as usize * self.width + x as usize])
    }

    /// Mutable sample at `(x, y)`. Panics when out of bounds.
    #[inline]
    pub fn at_mut(&mut self, x: usize, y: usize) -> &mut T {
        &mut self.data[y * self.width + x]
    }

    /// Row `y` as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}

/// Is this a usable depth sample?
#[inline]
pub fn is_valid_depth(d: f32) -> bool {
    d.is_finite() && d > 0.0
}

/// Is this a usable point or normal?
#[inline]
pub fn is_valid_vec(v: &Vector3<f32>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Is this a usable point?
#[inline]
pub fn is_valid_point(p: &Point3<f32>) -> bool {
    is_valid_vec(&p.coords)
}

/// Missing-point marker.
#[inline]
pub fn nan_point() -> Point3<f32> {
    Point3::new(f32::NAN, f32::NAN, f32::NAN)
}

/// Missing-normal marker.
#[inline]
pub fn nan_vector() -> Vector3<f32> {
    Vector3::new(f32::NAN, f32::NAN, f32::NAN)
}

impl DepthFrame {
    /// Convert raw 16-bit sensor samples to meters.
    ///
    /// `depth_factor` is the number of raw units per meter
    /// (5000 for TUM PNGs, 1000 for Kinect 2).
    pub fn from_raw_u16(
        width: usize,
        height: usize,
        raw: &[u16],
        depth_factor: f32,
    ) -> Result<Self> {
        let data = raw.iter().map(|&r| r as f32 / depth_factor).collect();
        Self::from_vec(width, height, data)
    }

    /// Convert raw float samples to meters (factor 1 for metric input).
    pub fn from_raw_f32(
        width: usize,
        height: usize,
        raw: &[f32],
        depth_factor: f32,
    ) -> Result<Self> {
        let data = raw.iter().map(|&r| r / depth_factor).collect();
        Self::from_vec(width, height, data)
    }

    /// Number of valid depth samples.
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&d| is_valid_depth(d)).count()
    }

    /// Zero out samples farther than `threshold` meters. No-op when `threshold <= 0`.
    pub fn truncate(&mut self, threshold: f32) {
        if threshold <= 0.0 {
            return;
        }
        for d in &mut self.data {
            if *d > threshold {
                *d = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Image::from_vec(4, 3, vec![0.0f32; 12]).is_ok());
        let err = Image::from_vec(4, 3, vec![0.0f32; 11]).unwrap_err();
        assert!(matches!(
            err,
            FusionError::BufferLengthMismatch {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn test_raw_conversion() {
        let depth = DepthFrame::from_raw_u16(2, 1, &[5000, 0], 5000.0).unwrap();
        assert_eq!(*depth.at(0, 0), 1.0);
        assert_eq!(depth.count_valid(), 1);
    }

    #[test]
    fn test_truncate() {
        let mut depth = DepthFrame::from_vec(3, 1, vec![0.5, 2.0, 4.5]).unwrap();
        depth.truncate(3.0);
        assert_eq!(depth.data(), &[0.5, 2.0, 0.0]);

        depth.truncate(0.0);
        assert_eq!(depth.count_valid(), 2);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let img = Image::filled(2, 2, 1u8);
        assert!(img.get(-1, 0).is_none());
        assert!(img.get(2, 0).is_none());
        assert_eq!(img.get(1, 1), Some(&1));
    }
}
