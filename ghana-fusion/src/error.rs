//! Error types for GhanaFusion

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::FrameSize;
use crate::graph::GraphError;
use crate::tracking::TrackingError;

/// GhanaFusion error type
#[derive(Error, Debug)]
pub enum FusionError {
    /// Parameters rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// Depth frame does not match the configured frame size.
    #[error("Frame size mismatch: expected {expected}, got {actual}")]
    FrameSizeMismatch {
        /// Configured frame size
        expected: FrameSize,
        /// Size of the rejected frame
        actual: FrameSize,
    },

    /// Pixel buffer length does not match `width * height`.
    #[error("Buffer length mismatch: expected {expected} samples, got {actual}")]
    BufferLengthMismatch {
        /// `width * height`
        expected: usize,
        /// Length of the supplied buffer
        actual: usize,
    },

    /// Frame-to-model alignment failed.
    #[error("Tracking lost: {0}")]
    TrackingLost(#[from] TrackingError),

    /// Pose graph solve did not reduce the residuals.
    #[error("Pose graph optimization diverged: {0}")]
    OptimizationDivergence(#[from] GraphError),
}

/// Result alias for fallible GhanaFusion operations.
pub type Result<T> = std::result::Result<T, FusionError>;
