//! Depth preprocessing.
//!
//! The fusion pipeline only depends on the [`DepthFilter`] trait, so callers
//! can plug in their own denoiser. [`BilateralFilter`] is the default.

use rayon::prelude::*;

use super::image::{DepthFrame, Image, is_valid_depth};

/// Edge-preserving depth denoiser applied before tracking and integration.
pub trait DepthFilter: Send + Sync {
    /// Filter a metric depth frame. Output must have the same size.
    fn filter(&self, depth: &DepthFrame) -> DepthFrame;
}

/// Leaves depth untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl DepthFilter for PassThrough {
    fn filter(&self, depth: &DepthFrame) -> DepthFrame {
        depth.clone()
    }
}

/// Bilateral smoothing over a square window.
///
/// Invalid samples are neither smoothed nor used as neighbors.
#[derive(Clone, Copy, Debug)]
pub struct BilateralFilter {
    /// Depth sigma in meters
    pub sigma_depth: f32,
    /// Spatial sigma in pixels
    pub sigma_spatial: f32,
    /// Window size in pixels (odd)
    pub kernel_size: usize,
}

impl BilateralFilter {
    /// Create a new bilateral filter.
    pub fn new(sigma_depth: f32, sigma_spatial: f32, kernel_size: usize) -> Self {
        Self {
            sigma_depth,
            sigma_spatial,
            kernel_size,
        }
    }
}

impl Default for BilateralFilter {
    fn default() -> Self {
        Self::new(0.04, 4.5, 7)
    }
}

impl DepthFilter for BilateralFilter {
    fn filter(&self, depth: &DepthFrame) -> DepthFrame {
        let width = depth.width();
        let height = depth.height();
        let mut out = Image::filled(width, height, 0.0f32);
        if width == 0 || self.kernel_size <= 1 {
            return depth.clone();
        }

        let radius = (self.kernel_size / 2) as i64;
        let inv_spatial = 1.0 / (2.0 * self.sigma_spatial * self.sigma_spatial);
        let inv_depth = 1.0 / (2.0 * self.sigma_depth * self.sigma_depth);

        out.data_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, dst) in row.iter_mut().enumerate() {
                    let center = *depth.at(x, y);
                    if !is_valid_depth(center) {
                        continue;
                    }
                    let mut sum = 0.0;
                    let mut weight_sum = 0.0;
                    for dy in -radius..=radius {
                        for dx in -radius..=radius {
                            let Some(&d) = depth.get(x as i64 + dx, y as i64 + dy) else {
                                continue;
                            };
                            if !is_valid_depth(d) {
                                continue;
                            }
                            let spatial = (dx * dx + dy * dy) as f32 * inv_spatial;
                            let range = (d - center) * (d - center) * inv_depth;
                            let w = (-spatial - range).exp();
                            sum += d * w;
                            weight_sum += w;
                        }
                    }
                    *dst = sum / weight_sum;
                }
            });
        out
    }
}
