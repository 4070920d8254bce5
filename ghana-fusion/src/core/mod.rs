//! Core types for the GhanaFusion library.
//!
//! ## Coordinate System
//!
//! Camera frames follow the usual depth-sensor convention:
//! - **X-axis**: Right in the image
//! - **Y-axis**: Down in the image
//! - **Z-axis**: Forward along the optical axis (depth)
//!
//! Poses map camera space to world space unless documented otherwise.
//!
//! ## Type Categories
//!
//! ### Geometry
//! - [`Pose`]: Rigid transform (`nalgebra::Isometry3<f32>`)
//! - [`Intrinsics`]: Pinhole model with projection/back-projection
//! - [`FrameSize`]: Image dimensions
//!
//! ### Images
//! - [`DepthFrame`]: Metric depth, zero means missing
//! - [`PointMap`] / [`NormalMap`]: Per-pixel points and normals, NaN means missing
//! - [`FramePyramid`]: Coarse-to-fine point/normal levels for ICP
//!
//! ### Preprocessing
//! - [`DepthFilter`]: Pluggable denoiser
//! - [`BilateralFilter`]: Default edge-preserving smoother

mod camera;
mod image;
mod preprocess;
mod pyramid;

pub mod pose;

pub use camera::{FrameSize, Intrinsics};
pub use image::{
    DepthFrame, Image, NormalMap, PointMap, is_valid_depth, is_valid_point, is_valid_vec,
    nan_point, nan_vector,
};
pub use pose::Pose;
pub use preprocess::{BilateralFilter, DepthFilter, PassThrough};
pub use pyramid::{FramePyramid, PyramidLevel, compute_normals, compute_points};
