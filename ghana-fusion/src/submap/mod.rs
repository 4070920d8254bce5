//! Submaps: bounded TSDF fragments linked by a pose graph.
//!
//! A single volume cannot cover an unbounded scene at useful resolution, so
//! the scene is split into submaps. Each submap owns one volume expressed in
//! its own frame and a world pose that the optimizer may adjust.
//!
//! ## Key Concepts
//!
//! - **Submap**: A locally consistent volume with an adjustable world pose
//! - **Transition**: When the camera's view overlaps the active submap too
//!   little, a new submap is seeded at the current camera pose
//! - **Overlap tracking**: The superseded submap keeps being tracked for a
//!   few frames; each observation refines the edge to its successor
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         World Frame                              │
//! │                                                                  │
//! │    Submap 0              Submap 1              Submap 2          │
//! │   ┌─────────┐           ┌─────────┐           ┌─────────┐       │
//! │   │ TSDF    │  ──T01──▶ │ TSDF    │  ──T12──▶ │ TSDF    │       │
//! │   │ volume  │           │ volume  │           │ volume  │       │
//! │   └────┬────┘           └────┬────┘           └────┬────┘       │
//! │        │                     │                     │             │
//! │        ▼                     ▼                     ▼             │
//! │   pose_0 (fixed)        pose_1 (opt)          pose_2 (opt)      │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! After pose graph optimization only submap poses change; volumes are
//! never touched.

mod config;
mod manager;
mod types;

pub use config::{SubmapConfig, VisibilityMetric};
pub use manager::{SubmapCorrection, SubmapManager};
pub use types::{Submap, SubmapId, SubmapState};
