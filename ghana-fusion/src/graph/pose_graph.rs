//! Pose graph over submap poses.
//!
//! - Nodes are submap poses in the world frame
//! - Edges are relative pose constraints `T_from⁻¹ · T_to` between submaps

use std::collections::HashMap;

use nalgebra::{Isometry3, Matrix6, Vector6};

use super::optimizer::GraphError;
use crate::core::Pose;
use crate::core::pose::{exp_twist, log_pose, to_f32, to_f64};
use crate::submap::SubmapId;

/// Default per-observation information: 5cm / ~3° standard deviation.
pub fn default_information() -> Matrix6<f64> {
    let sigma_t: f64 = 0.05;
    let sigma_r: f64 = 0.05;
    Matrix6::from_diagonal(&Vector6::new(
        1.0 / (sigma_t * sigma_t),
        1.0 / (sigma_t * sigma_t),
        1.0 / (sigma_t * sigma_t),
        1.0 / (sigma_r * sigma_r),
        1.0 / (sigma_r * sigma_r),
        1.0 / (sigma_r * sigma_r),
    ))
}

/// A node holding one submap's optimizable world pose.
#[derive(Debug, Clone)]
pub struct PoseNode {
    /// Submap this node belongs to.
    pub id: SubmapId,

    /// Current pose estimate (world frame).
    pub pose: Pose,

    /// Held constant during optimization (gauge reference).
    pub fixed: bool,
}

/// Relative pose constraint between two submaps.
#[derive(Debug, Clone)]
pub struct PoseEdge {
    /// Source submap.
    pub from: SubmapId,

    /// Target submap.
    pub to: SubmapId,

    /// Measured relative pose `T_from⁻¹ · T_to`.
    pub measurement: Pose,

    /// Information of a single observation.
    pub information: Matrix6<f64>,

    /// Number of observations averaged into `measurement`.
    pub observations: u32,
}

impl PoseEdge {
    /// Create an edge from a single observation.
    pub fn new(from: SubmapId, to: SubmapId, measurement: Pose, information: Matrix6<f64>) -> Self {
        Self {
            from,
            to,
            measurement,
            information,
            observations: 1,
        }
    }

    /// Effective information: grows with the number of observations.
    pub fn weighted_information(&self) -> Matrix6<f64> {
        self.information * self.observations as f64
    }

    /// Residual `log(Z⁻¹ · T_from⁻¹ · T_to)` for the given node poses.
    pub fn error(&self, from_pose: &Isometry3<f64>, to_pose: &Isometry3<f64>) -> Vector6<f64> {
        let z = to_f64(&self.measurement);
        log_pose(&(z.inverse() * from_pose.inverse() * to_pose))
    }

    /// Fold another relative pose observation into the running mean.
    fn observe(&mut self, relative: &Pose) {
        let n = self.observations as f64 + 1.0;
        let current = to_f64(&self.measurement);
        let step = log_pose(&(current.inverse() * to_f64(relative))) / n;
        self.measurement = to_f32(&(current * exp_twist(&step)));
        self.observations += 1;
    }
}

/// Pose graph with nodes in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PoseGraph {
    nodes: Vec<PoseNode>,
    index: HashMap<SubmapId, usize>,
    edges: Vec<PoseEdge>,
}

impl PoseGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. The first node added is fixed.
    ///
    /// Re-adding an existing id overwrites its pose.
    pub fn add_node(&mut self, id: SubmapId, pose: Pose) {
        if let Some(&i) = self.index.get(&id) {
            self.nodes[i].pose = pose;
            return;
        }
        let fixed = self.nodes.is_empty();
        self.index.insert(id, self.nodes.len());
        self.nodes.push(PoseNode { id, pose, fixed });
    }

    /// Add a constraint between two existing nodes.
    pub fn add_edge(
        &mut self,
        from: SubmapId,
        to: SubmapId,
        measurement: Pose,
        information: Matrix6<f64>,
    ) -> Result<(), GraphError> {
        self.check_node(from)?;
        self.check_node(to)?;
        self.edges.push(PoseEdge::new(from, to, measurement, information));
        Ok(())
    }

    /// Average a new relative pose observation into the `from → to` edge,
    /// creating the edge if it does not exist yet.
    pub fn add_observation(
        &mut self,
        from: SubmapId,
        to: SubmapId,
        relative: &Pose,
    ) -> Result<(), GraphError> {
        match self.edges.iter_mut().find(|e| e.from == from && e.to == to) {
            Some(edge) => {
                edge.observe(relative);
                Ok(())
            }
            None => self.add_edge(from, to, *relative, default_information()),
        }
    }

    /// Get a node by id.
    pub fn get_node(&self, id: SubmapId) -> Option<&PoseNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Position of a node in insertion order.
    pub fn node_index(&self, id: SubmapId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Overwrite a node's pose.
    pub fn set_pose(&mut self, id: SubmapId, pose: Pose) -> Result<(), GraphError> {
        let i = *self.index.get(&id).ok_or(GraphError::UnknownNode(id))?;
        self.nodes[i].pose = pose;
        Ok(())
    }

    /// Mark a node fixed or free.
    pub fn set_fixed(&mut self, id: SubmapId, fixed: bool) -> Result<(), GraphError> {
        let i = *self.index.get(&id).ok_or(GraphError::UnknownNode(id))?;
        self.nodes[i].fixed = fixed;
        Ok(())
    }

    /// The edge from `from` to `to`, if any.
    pub fn edge_between(&self, from: SubmapId, to: SubmapId) -> Option<&PoseEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[PoseNode] {
        &self.nodes
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[PoseEdge] {
        &self.edges
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Information-weighted sum of squared edge residuals.
    pub fn chi_squared(&self) -> f64 {
        let poses: Vec<Isometry3<f64>> = self.nodes.iter().map(|n| to_f64(&n.pose)).collect();
        self.chi_squared_with(&poses)
    }

    /// Chi² for an alternative set of node poses, indexed like `nodes()`.
    pub(crate) fn chi_squared_with(&self, poses: &[Isometry3<f64>]) -> f64 {
        self.edges
            .iter()
            .filter_map(|edge| {
                let i = self.node_index(edge.from)?;
                let j = self.node_index(edge.to)?;
                let e = edge.error(&poses[i], &poses[j]);
                Some(e.dot(&(edge.weighted_information() * e)))
            })
            .sum()
    }

    /// Remove all nodes and edges.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.edges.clear();
    }

    fn check_node(&self, id: SubmapId) -> Result<(), GraphError> {
        if self.index.contains_key(&id) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(id))
        }
    }
}
