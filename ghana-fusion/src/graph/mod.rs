//! Pose graph over submaps and its optimizers.
//!
//! Each submap is a node holding its world pose; consecutive submaps are
//! linked by the relative pose observed at the transition frame and refined
//! while both are tracked. The first submap is the gauge node.
//!
//! - [`PoseGraph`]: nodes, edges, chi²
//! - [`GraphOptimizer`]: Levenberg-Marquardt on SE(3), works on a copy
//! - [`BackgroundOptimizer`]: the same solve on a worker thread

mod background;
mod config;
mod optimizer;
mod pose_graph;

pub use background::{BackgroundOptimizer, OptimizationOutcome};
pub use config::GraphOptimizerConfig;
pub use optimizer::{GraphError, GraphOptimizer, OptimizationResult, TerminationReason};
pub use pose_graph::{PoseEdge, PoseGraph, PoseNode, default_information};
