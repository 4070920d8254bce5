//! Multi-resolution point/normal pyramids for coarse-to-fine tracking.
//!
//! ```text
//! level 0   640×480   ┌────────────────┐  finest, last ICP stage
//! level 1   320×240   ┌────────┐
//! level 2   160×120   ┌────┐
//! level 3    80×60    ┌──┐              coarsest, first ICP stage
//! ```

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::camera::Intrinsics;
use super::image::{
    DepthFrame, Image, NormalMap, PointMap, is_valid_depth, is_valid_point, is_valid_vec,
    nan_point, nan_vector,
};

/// Points and normals of a single pyramid level.
#[derive(Clone, Debug)]
pub struct PyramidLevel {
    /// Camera-frame points
    pub points: PointMap,
    /// Unit normals facing the camera
    pub normals: NormalMap,
}

impl PyramidLevel {
    /// Number of pixels with both a valid point and a valid normal.
    pub fn valid_count(&self) -> usize {
        self.points
            .data()
            .iter()
            .zip(self.normals.data())
            .filter(|(p, n)| is_valid_point(p) && is_valid_vec(n))
            .count()
    }
}

/// Point/normal pyramid of one frame (index 0 = full resolution).
#[derive(Clone, Debug)]
pub struct FramePyramid {
    levels: Vec<PyramidLevel>,
}

impl FramePyramid {
    /// Build from a preprocessed depth frame.
    ///
    /// Depth is downsampled with a 2×2 block average that ignores invalid
    /// samples and samples more than `3·sigma_depth` away from the block's
    /// top-left sample, then back-projected per level.
    pub fn from_depth(
        depth: &DepthFrame,
        intrinsics: &Intrinsics,
        num_levels: usize,
        sigma_depth: f32,
    ) -> Self {
        let mut levels = Vec::with_capacity(num_levels);
        let mut level_depth = depth.clone();
        for level in 0..num_levels {
            if level > 0 {
                level_depth = pyr_down_depth(&level_depth, sigma_depth);
            }
            let points = compute_points(&level_depth, &intrinsics.scaled(level));
            let normals = compute_normals(&points);
            levels.push(PyramidLevel { points, normals });
        }
        Self { levels }
    }

    /// Build from raycast output (full-resolution points and normals).
    pub fn from_points_normals(points: PointMap, normals: NormalMap, num_levels: usize) -> Self {
        let mut levels = Vec::with_capacity(num_levels);
        levels.push(PyramidLevel { points, normals });
        for level in 1..num_levels {
            let next = pyr_down_points_normals(&levels[level - 1]);
            levels.push(next);
        }
        Self { levels }
    }

    /// Number of levels.
    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Level `level` (0 = finest).
    #[inline]
    pub fn level(&self, level: usize) -> &PyramidLevel {
        &self.levels[level]
    }

    /// Full-resolution level.
    #[inline]
    pub fn finest(&self) -> &PyramidLevel {
        &self.levels[0]
    }
}

/// Back-project every valid depth sample.
pub fn compute_points(depth: &DepthFrame, intrinsics: &Intrinsics) -> PointMap {
    let width = depth.width();
    let mut points = Image::filled(width, depth.height(), nan_point());
    if width == 0 {
        return points;
    }
    points
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let d = *depth.at(x, y);
                if is_valid_depth(d) {
                    *out = intrinsics.reproject(x as f32, y as f32, d);
                }
            }
        });
    points
}

/// Normals from forward differences of the point map, oriented toward the camera.
pub fn compute_normals(points: &PointMap) -> NormalMap {
    let width = points.width();
    let height = points.height();
    let mut normals = Image::filled(width, height, nan_vector());
    if width < 2 || height < 2 {
        return normals;
    }
    normals
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            if y + 1 >= height {
                return;
            }
            for x in 0..width - 1 {
                let p = points.at(x, y);
                let px = points.at(x + 1, y);
                let py = points.at(x, y + 1);
                if !(is_valid_point(p) && is_valid_point(px) && is_valid_point(py)) {
                    continue;
                }
                let n = (px - p).cross(&(py - p));
                let len = n.norm();
                if len <= f32::EPSILON {
                    continue;
                }
                let mut n = n / len;
                if n.dot(&p.coords) > 0.0 {
                    n = -n;
                }
                row[x] = n;
            }
        });
    normals
}

/// Halve a depth image with an edge-preserving 2×2 average.
pub fn pyr_down_depth(depth: &DepthFrame, sigma_depth: f32) -> DepthFrame {
    let width = depth.width() / 2;
    let height = depth.height() / 2;
    let mut out = Image::filled(width, height, 0.0f32);
    if width == 0 {
        return out;
    }
    let max_diff = 3.0 * sigma_depth;
    out.data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.iter_mut().enumerate() {
                let center = *depth.at(2 * x, 2 * y);
                if !is_valid_depth(center) {
                    continue;
                }
                let mut sum = 0.0;
                let mut count = 0;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let d = *depth.at(2 * x + dx, 2 * y + dy);
                    if is_valid_depth(d) && (d - center).abs() <= max_diff {
                        sum += d;
                        count += 1;
                    }
                }
                *dst = sum / count as f32;
            }
        });
    out
}

/// Halve a point/normal level by averaging the valid samples of each 2×2 block.
pub fn pyr_down_points_normals(src: &PyramidLevel) -> PyramidLevel {
    let width = src.points.width() / 2;
    let height = src.points.height() / 2;
    let mut points = Image::filled(width, height, nan_point());
    let mut normals = Image::filled(width, height, nan_vector());
    if width == 0 {
        return PyramidLevel { points, normals };
    }
    points
        .data_mut()
        .par_chunks_mut(width)
        .zip(normals.data_mut().par_chunks_mut(width))
        .enumerate()
        .for_each(|(y, (prow, nrow))| {
            for x in 0..width {
                let mut p_sum = Vector3::zeros();
                let mut n_sum = Vector3::zeros();
                let mut count = 0;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let p = src.points.at(2 * x + dx, 2 * y + dy);
                    let n = src.normals.at(2 * x + dx, 2 * y + dy);
                    if is_valid_point(p) && is_valid_vec(n) {
                        p_sum += p.coords;
                        n_sum += n;
                        count += 1;
                    }
                }
                if count == 0 {
                    continue;
                }
                let n_len = n_sum.norm();
                if n_len <= f32::EPSILON {
                    continue;
                }
                prow[x] = Point3::from(p_sum / count as f32);
                nrow[x] = n_sum / n_len;
            }
        });
    PyramidLevel { points, normals }
}
