//! Projective point-to-plane ICP.
//!
//! Aligns the current frame to a model raycast taken from the previous pose.
//! The estimate `T` maps current-camera points into the reference camera.
//!
//! Residual for a current point `p` associated with reference point `r` and
//! reference normal `n`:
//!
//! ```text
//! e = n · (T·p − r)
//! ∂e/∂ρ = n
//! ∂e/∂φ = (T·p) × n        (left perturbation T ← exp(δ)·T)
//! ```
//!
//! Normal equations are accumulated per image row in parallel and summed in
//! row order, so the result does not depend on thread scheduling.

use log::trace;
use nalgebra::{Cholesky, Matrix6, Vector6};
use rayon::prelude::*;
use thiserror::Error;

use super::config::IcpConfig;
use crate::core::pose::{exp_twist, to_f32, to_f64};
use crate::core::{FramePyramid, Intrinsics, Pose, PyramidLevel, is_valid_point, is_valid_vec};

/// Recoverable tracking failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// The reference raycast contains no surface.
    #[error("reference model has no visible surface")]
    EmptyReference,

    /// Correspondence rejection left too few pairs.
    #[error("{found} correspondences at level {level}, need {required}")]
    TooFewCorrespondences {
        /// Pyramid level (0 = finest)
        level: usize,
        /// Surviving correspondences
        found: usize,
        /// Configured minimum
        required: usize,
    },

    /// Normal equations are singular or produced a non-finite update.
    #[error("degenerate ICP system at level {level}")]
    DegenerateSystem {
        /// Pyramid level (0 = finest)
        level: usize,
    },
}

/// Outcome of a successful alignment.
#[derive(Clone, Debug)]
pub struct IcpResult {
    /// Transform from the current camera into the reference camera.
    pub transform: Pose,
    /// Correspondences used in the last finest-level iteration.
    pub correspondences: usize,
    /// Total Gauss-Newton iterations across all levels.
    pub iterations: usize,
}

/// Accumulated normal equations.
#[derive(Clone, Copy)]
struct NormalEquations {
    a: Matrix6<f64>,
    b: Vector6<f64>,
    count: usize,
}

impl NormalEquations {
    fn zero() -> Self {
        Self {
            a: Matrix6::zeros(),
            b: Vector6::zeros(),
            count: 0,
        }
    }

    fn add(mut self, other: &Self) -> Self {
        self.a += other.a;
        self.b += other.b;
        self.count += other.count;
        self
    }
}

/// Multi-level point-to-plane ICP tracker.
#[derive(Debug, Clone)]
pub struct IcpTracker {
    config: IcpConfig,
}

impl IcpTracker {
    /// Create a tracker.
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    /// Tracker configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Align `current` to `reference`, starting from `initial`.
    ///
    /// Levels run coarsest to finest. Both pyramids must have at least as many
    /// levels as the configured iteration schedule.
    pub fn track(
        &self,
        current: &FramePyramid,
        reference: &FramePyramid,
        intrinsics: &Intrinsics,
        initial: &Pose,
    ) -> Result<IcpResult, TrackingError> {
        if reference.finest().valid_count() == 0 {
            return Err(TrackingError::EmptyReference);
        }

        let levels = self
            .config
            .num_levels()
            .min(current.num_levels())
            .min(reference.num_levels());
        let cos_angle = self.config.angle_thresh.cos();

        let mut transform = to_f64(initial);
        let mut total_iterations = 0;
        let mut last_count = 0;

        for level in (0..levels).rev() {
            let level_intr = intrinsics.scaled(level);
            let cur = current.level(level);
            let refl = reference.level(level);

            for _ in 0..self.config.iterations[level] {
                let t32 = to_f32(&transform);
                let system = accumulate(cur, refl, &level_intr, &t32, self.config.dist_thresh, cos_angle);
                total_iterations += 1;
                last_count = system.count;

                if system.count < self.config.min_correspondences {
                    return Err(TrackingError::TooFewCorrespondences {
                        level,
                        found: system.count,
                        required: self.config.min_correspondences,
                    });
                }

                let delta = solve(&system).ok_or(TrackingError::DegenerateSystem { level })?;
                transform = exp_twist(&delta) * transform;

                if delta.norm() < self.config.convergence_epsilon {
                    break;
                }
            }
            trace!(
                "ICP level {} done: {} correspondences, t=({:.4}, {:.4}, {:.4})",
                level,
                last_count,
                transform.translation.vector.x,
                transform.translation.vector.y,
                transform.translation.vector.z
            );
        }

        Ok(IcpResult {
            transform: to_f32(&transform),
            correspondences: last_count,
            iterations: total_iterations,
        })
    }
}

/// Build the 6×6 system over all associated pixel pairs.
fn accumulate(
    current: &PyramidLevel,
    reference: &PyramidLevel,
    intrinsics: &Intrinsics,
    transform: &Pose,
    dist_thresh: f32,
    cos_angle: f32,
) -> NormalEquations {
    let width = current.points.width();
    let rows: Vec<NormalEquations> = (0..current.points.height())
        .into_par_iter()
        .map(|y| {
            let mut eq = NormalEquations::zero();
            for x in 0..width {
                let p = current.points.at(x, y);
                let n = current.normals.at(x, y);
                if !is_valid_point(p) || !is_valid_vec(n) {
                    continue;
                }
                let q = transform * p;
                if q.z <= 0.0 {
                    continue;
                }
                let (u, v) = intrinsics.project(&q);
                let (Some(r), Some(nr)) = (
                    reference.points.get(u.round() as i64, v.round() as i64),
                    reference.normals.get(u.round() as i64, v.round() as i64),
                ) else {
                    continue;
                };
                if !is_valid_point(r) || !is_valid_vec(nr) {
                    continue;
                }
                let diff = q - r;
                if diff.norm() > dist_thresh {
                    continue;
                }
                if (transform.rotation * n).dot(nr) < cos_angle {
                    continue;
                }

                let residual = nr.dot(&diff) as f64;
                let cross = q.coords.cross(nr);
                let j = Vector6::new(
                    nr.x as f64,
                    nr.y as f64,
                    nr.z as f64,
                    cross.x as f64,
                    cross.y as f64,
                    cross.z as f64,
                );
                eq.a += j * j.transpose();
                eq.b -= j * residual;
                eq.count += 1;
            }
            eq
        })
        .collect();

    rows.iter().fold(NormalEquations::zero(), NormalEquations::add)
}

/// Solve the normal equations with a tiny relative damping term.
fn solve(system: &NormalEquations) -> Option<Vector6<f64>> {
    let damping = 1e-9 * system.a.trace().max(f64::EPSILON);
    let a = system.a + Matrix6::identity() * damping;
    let x = Cholesky::new(a)?.solve(&system.b);
    x.iter().all(|v| v.is_finite()).then_some(x)
}
