//! Frame-to-model camera tracking.
//!
//! The tracker aligns the preprocessed current frame against a raycast of
//! the active submap taken from the previous pose, coarse to fine:
//!
//! ```text
//!   current depth ──► pyramid ─┐
//!                              ├──► point-to-plane ICP ──► ΔT
//!   model raycast ──► pyramid ─┘        (per level)
//! ```

mod config;
mod icp;

pub use config::IcpConfig;
pub use icp::{IcpResult, IcpTracker, TrackingError};
