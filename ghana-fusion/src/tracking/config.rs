//! Configuration for point-to-plane ICP.

/// Configuration for point-to-plane ICP.
#[derive(Debug, Clone)]
pub struct IcpConfig {
    /// Iterations per pyramid level, finest level first.
    pub iterations: Vec<usize>,

    /// Maximum point-to-point distance of a correspondence (meters).
    pub dist_thresh: f32,

    /// Maximum angle between corresponding normals (radians).
    pub angle_thresh: f32,

    /// Minimum number of surviving correspondences at every level.
    pub min_correspondences: usize,

    /// Stop iterating a level once the update twist norm drops below this.
    pub convergence_epsilon: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            iterations: vec![10, 5, 4],
            dist_thresh: 0.1,
            angle_thresh: 30f32.to_radians(),
            min_correspondences: 100,
            convergence_epsilon: 1e-6,
        }
    }
}

impl IcpConfig {
    /// Number of pyramid levels this config iterates over.
    #[inline]
    pub fn num_levels(&self) -> usize {
        self.iterations.len()
    }
}
