//! Levenberg-Marquardt optimization of the submap pose graph.
//!
//! # Algorithm
//!
//! Minimizes
//!
//! ```text
//! F(x) = Σ e_ijᵀ · Ω_ij · e_ij,    e_ij = log(Z_ij⁻¹ · T_i⁻¹ · T_j)
//! ```
//!
//! with right-perturbation updates `T ← T · exp(δ)` per free node. With
//! `E = Z⁻¹·T_i⁻¹·T_j` and `D = blockdiag(R_E, I)`:
//!
//! ```text
//! ∂e/∂δ_j = D
//! ∂e/∂δ_i = −D · Ad(T_j⁻¹ · T_i)
//! ```
//!
//! Each iteration solves `(H + λ·(I + diag H)) δ = −b`. A step is accepted
//! only when chi² decreases; otherwise λ grows tenfold and the step is
//! retried. Fixed nodes are not part of the linear system.

use log::debug;
use nalgebra::{DMatrix, DVector, Isometry3, Matrix6, Vector6};
use thiserror::Error;

use super::config::GraphOptimizerConfig;
use super::pose_graph::PoseGraph;
use crate::core::Pose;
use crate::core::pose::{adjoint, exp_twist, is_finite, to_f32, to_f64};
use crate::submap::{SubmapCorrection, SubmapId};

/// Gradient norm below which a stalled solve counts as converged.
const GRADIENT_TOLERANCE: f64 = 1e-8;

/// Pose graph optimization failure. The caller keeps its previous poses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// No step reduced chi² and the current estimate is not stationary.
    #[error("chi² did not decrease ({initial_error:.6} -> {final_error:.6})")]
    Diverged {
        /// Chi² before optimization
        initial_error: f64,
        /// Chi² when the solve was abandoned
        final_error: f64,
    },

    /// A pose or residual became NaN or infinite.
    #[error("non-finite pose or residual")]
    NonFinite,

    /// An edge or update referenced a node that is not in the graph.
    #[error("unknown node {0}")]
    UnknownNode(SubmapId),
}

/// Reason for optimization termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Relative chi² change below threshold, or no further descent possible.
    Converged,

    /// Chi² below the absolute error floor.
    MinError,

    /// Maximum iterations reached.
    MaxIterations,

    /// Nothing to optimize (no edges or no free nodes).
    NoEdges,
}

/// Result of graph optimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Optimized pose for every node of the input graph, in node order.
    pub poses: Vec<(SubmapId, Pose)>,

    /// Number of iterations performed.
    pub iterations: usize,

    /// Initial chi-squared error.
    pub initial_error: f64,

    /// Final chi-squared error.
    pub final_error: f64,

    /// Reason for termination.
    pub termination_reason: TerminationReason,
}

impl OptimizationResult {
    /// Poses as submap corrections.
    pub fn corrections(&self) -> Vec<SubmapCorrection> {
        self.poses
            .iter()
            .map(|&(submap_id, new_pose)| SubmapCorrection { submap_id, new_pose })
            .collect()
    }
}

/// Levenberg-Marquardt pose graph optimizer.
#[derive(Debug, Clone)]
pub struct GraphOptimizer {
    config: GraphOptimizerConfig,
}

impl GraphOptimizer {
    /// Create a new graph optimizer.
    pub fn new(config: GraphOptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimizer configuration.
    pub fn config(&self) -> &GraphOptimizerConfig {
        &self.config
    }

    /// Optimize a copy of `graph` and return the updated node poses.
    ///
    /// The input graph is left untouched.
    pub fn optimize(&self, graph: &PoseGraph) -> Result<OptimizationResult, GraphError> {
        let mut poses: Vec<Isometry3<f64>> = graph.nodes().iter().map(|n| to_f64(&n.pose)).collect();

        // Variable slot per node, None for fixed nodes
        let mut num_free = 0;
        let slots: Vec<Option<usize>> = graph
            .nodes()
            .iter()
            .map(|n| {
                if n.fixed {
                    None
                } else {
                    num_free += 1;
                    Some(num_free - 1)
                }
            })
            .collect();
        let dim = num_free * 6;

        let initial_error = graph.chi_squared_with(&poses);
        if !initial_error.is_finite() {
            return Err(GraphError::NonFinite);
        }

        if graph.num_edges() == 0 || dim == 0 {
            return Ok(self.finish(graph, &poses, 0, initial_error, initial_error, TerminationReason::NoEdges));
        }
        if initial_error < self.config.min_error {
            return Ok(self.finish(graph, &poses, 0, initial_error, initial_error, TerminationReason::MinError));
        }

        let mut lambda = self.config.initial_damping;
        let mut current_error = initial_error;
        let mut iterations = 0;
        let mut reason = TerminationReason::MaxIterations;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let (h, b) = build_linear_system(graph, &poses, &slots, dim);

            let mut accepted = None;
            while lambda <= self.config.max_damping {
                if let Some(dx) = solve_damped(&h, &b, lambda) {
                    let candidate = apply_update(&poses, &slots, &dx);
                    let error = graph.chi_squared_with(&candidate);
                    if error.is_finite() && error < current_error {
                        accepted = Some((candidate, error));
                        lambda = (lambda * 0.1).max(1e-12);
                        break;
                    }
                }
                lambda *= 10.0;
            }

            let Some((candidate, new_error)) = accepted else {
                // No descent direction left: either stationary or diverged
                if current_error < initial_error || b.norm() <= GRADIENT_TOLERANCE {
                    reason = TerminationReason::Converged;
                    break;
                }
                return Err(GraphError::Diverged {
                    initial_error,
                    final_error: current_error,
                });
            };

            let relative_change = (current_error - new_error) / current_error.max(1e-300);
            poses = candidate;
            current_error = new_error;
            debug!(
                "Pose graph iteration {}: chi² {:.6e}, lambda {:.1e}",
                iterations, current_error, lambda
            );

            if current_error < self.config.min_error {
                reason = TerminationReason::MinError;
                break;
            }
            if relative_change < self.config.convergence_threshold {
                reason = TerminationReason::Converged;
                break;
            }
        }

        if !poses.iter().all(is_finite) {
            return Err(GraphError::NonFinite);
        }
        Ok(self.finish(graph, &poses, iterations, initial_error, current_error, reason))
    }

    fn finish(
        &self,
        graph: &PoseGraph,
        poses: &[Isometry3<f64>],
        iterations: usize,
        initial_error: f64,
        final_error: f64,
        termination_reason: TerminationReason,
    ) -> OptimizationResult {
        OptimizationResult {
            poses: graph
                .nodes()
                .iter()
                .zip(poses)
                .map(|(node, pose)| (node.id, to_f32(pose)))
                .collect(),
            iterations,
            initial_error,
            final_error,
            termination_reason,
        }
    }
}

/// Build `H = Σ JᵀΩJ` and `b = Σ JᵀΩe` over the free variables.
fn build_linear_system(
    graph: &PoseGraph,
    poses: &[Isometry3<f64>],
    slots: &[Option<usize>],
    dim: usize,
) -> (DMatrix<f64>, DVector<f64>) {
    let mut h = DMatrix::zeros(dim, dim);
    let mut b = DVector::zeros(dim);

    for edge in graph.edges() {
        let (Some(i), Some(j)) = (graph.node_index(edge.from), graph.node_index(edge.to)) else {
            continue;
        };

        let z = to_f64(&edge.measurement);
        let err_pose = z.inverse() * poses[i].inverse() * poses[j];
        let e = edge.error(&poses[i], &poses[j]);

        let mut d = Matrix6::<f64>::identity();
        d.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(err_pose.rotation.to_rotation_matrix().matrix());
        let jj = d;
        let ji = -d * adjoint(&(poses[j].inverse() * poses[i]));
        let omega = edge.weighted_information();

        let blocks = [(slots[i], ji), (slots[j], jj)];
        for &(row, ja) in &blocks {
            let Some(row) = row else { continue };
            let jt_omega = ja.transpose() * omega;
            let mut b_view = b.fixed_rows_mut::<6>(row * 6);
            b_view += jt_omega * e;
            for &(col, jc) in &blocks {
                let Some(col) = col else { continue };
                let mut h_view = h.fixed_view_mut::<6, 6>(row * 6, col * 6);
                h_view += jt_omega * jc;
            }
        }
    }

    (h, b)
}

/// Solve `(H + λ·(I + diag H)) δ = −b`.
fn solve_damped(h: &DMatrix<f64>, b: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut damped = h.clone();
    for k in 0..damped.nrows() {
        damped[(k, k)] += lambda * (1.0 + h[(k, k)]);
    }
    let dx = damped.cholesky()?.solve(&(-b));
    dx.iter().all(|v| v.is_finite()).then_some(dx)
}

/// Apply `T ← T · exp(δ)` to every free node.
fn apply_update(poses: &[Isometry3<f64>], slots: &[Option<usize>], dx: &DVector<f64>) -> Vec<Isometry3<f64>> {
    poses
        .iter()
        .zip(slots)
        .map(|(pose, slot)| match slot {
            Some(k) => {
                let delta = Vector6::from_iterator(dx.rows(k * 6, 6).iter().copied());
                pose * exp_twist(&delta)
            }
            None => *pose,
        })
        .collect()
}
