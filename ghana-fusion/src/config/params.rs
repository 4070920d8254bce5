//! Full fusion parameter set and presets.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::graph::GraphOptimizerConfig;
use crate::submap::SubmapConfig;
use crate::volume::{VolumeKind, VolumeParams};

use super::error::ConfigError;
use super::sections::{CameraSection, PreprocessSection, RenderSection, TrackingSection};

/// Full GhanaFusion configuration, loadable from YAML
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    /// Depth camera
    #[serde(default)]
    pub camera: CameraSection,

    /// Depth preprocessing
    #[serde(default)]
    pub preprocess: PreprocessSection,

    /// ICP tracking and integration gating
    #[serde(default)]
    pub tracking: TrackingSection,

    /// Per-submap TSDF volume
    #[serde(default)]
    pub volume: VolumeParams,

    /// Submap transitions
    #[serde(default)]
    pub submap: SubmapConfig,

    /// Pose graph optimization
    #[serde(default)]
    pub optimizer: GraphOptimizerConfig,

    /// Rendering
    #[serde(default)]
    pub render: RenderSection,
}

impl Default for Params {
    /// Hashed volume at full resolution. A dense 512³ default would need
    /// about a gigabyte per submap.
    fn default() -> Self {
        Self::hash_tsdf_params(false)
    }
}

impl Params {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Load from default config path (configs/fusion.yaml)
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new("configs/fusion.yaml");
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// High quality preset: dense 512³ volume, three pyramid levels.
    pub fn default_params() -> Self {
        Self {
            camera: CameraSection::default(),
            preprocess: PreprocessSection::default(),
            tracking: TrackingSection::default(),
            volume: VolumeParams::default_params(VolumeKind::Tsdf),
            submap: SubmapConfig::default(),
            optimizer: GraphOptimizerConfig::default(),
            render: RenderSection::default(),
        }
    }

    /// Fast preset: dense 128³ volume, fewer ICP iterations.
    pub fn coarse_params() -> Self {
        let mut params = Self::default_params();
        params.volume = VolumeParams::coarse_params(VolumeKind::Tsdf);
        params.tracking.icp_iterations = vec![5, 3, 2];
        params
    }

    /// Hashed volume preset, full or coarse resolution.
    pub fn hash_tsdf_params(is_coarse: bool) -> Self {
        let mut params = if is_coarse {
            Self::coarse_params()
        } else {
            Self::default_params()
        };
        params.volume = if is_coarse {
            VolumeParams::coarse_params(VolumeKind::HashTsdf)
        } else {
            VolumeParams::default_params(VolumeKind::HashTsdf)
        };
        params.preprocess.truncate_threshold = 4.0;
        params
    }

    /// Check every section and the cross-section constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.camera.frame_size;
        if size.width == 0 || size.height == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "frame size must be non-zero, got {}",
                size
            )));
        }

        let intr = &self.camera.intrinsics;
        if !(intr.fx > 0.0 && intr.fy > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "focal lengths must be positive, got fx={} fy={}",
                intr.fx, intr.fy
            )));
        }

        if !(self.camera.depth_factor > 0.0) {
            return Err(ConfigError::InvalidValue(
                "depth_factor must be positive".to_string(),
            ));
        }

        let levels = self.tracking.pyramid_levels;
        if levels == 0 {
            return Err(ConfigError::InvalidValue(
                "pyramid_levels must be > 0".to_string(),
            ));
        }
        if self.tracking.icp_iterations.len() != levels {
            return Err(ConfigError::InvalidValue(format!(
                "icp_iterations has {} entries but pyramid_levels is {}",
                self.tracking.icp_iterations.len(),
                levels
            )));
        }
        // Every level must still have pixels after halving
        let coarsest = size.at_level(levels - 1);
        if coarsest.width == 0 || coarsest.height == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{} pyramid levels is too many for a {} frame",
                levels, size
            )));
        }

        if !(self.tracking.icp_dist_thresh > 0.0) {
            return Err(ConfigError::InvalidValue(
                "icp_dist_thresh must be positive".to_string(),
            ));
        }
        if !(0.0..=std::f32::consts::PI).contains(&self.tracking.icp_angle_thresh) {
            return Err(ConfigError::InvalidValue(format!(
                "icp_angle_thresh ({}) must be within [0, π]",
                self.tracking.icp_angle_thresh
            )));
        }
        if !(self.tracking.tsdf_min_camera_movement >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "tsdf_min_camera_movement must be non-negative".to_string(),
            ));
        }

        let pre = &self.preprocess;
        if pre.bilateral_kernel_size == 0 || pre.bilateral_kernel_size % 2 == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "bilateral_kernel_size ({}) must be odd",
                pre.bilateral_kernel_size
            )));
        }
        if !(pre.bilateral_sigma_depth > 0.0 && pre.bilateral_sigma_spatial > 0.0) {
            return Err(ConfigError::InvalidValue(
                "bilateral sigmas must be positive".to_string(),
            ));
        }
        if !(pre.truncate_threshold >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "truncate_threshold must be non-negative".to_string(),
            ));
        }

        self.volume.validate()?;
        self.submap.validate()?;
        self.optimizer.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let params = Params::default();
        assert_eq!(params.volume.kind, VolumeKind::HashTsdf);
        assert_eq!(params.camera.frame_size.width, 640);
        assert_eq!(params.tracking.icp_iterations, vec![10, 5, 4]);
        assert_eq!(params.preprocess.truncate_threshold, 4.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let dense = Params::default_params();
        assert_eq!(dense.volume.kind, VolumeKind::Tsdf);
        assert_eq!(dense.volume.resolution, [512; 3]);
        assert!(dense.validate().is_ok());

        let coarse = Params::coarse_params();
        assert_eq!(coarse.volume.resolution, [128; 3]);
        assert_eq!(coarse.tracking.icp_iterations, vec![5, 3, 2]);
        assert!(coarse.validate().is_ok());

        let hash_coarse = Params::hash_tsdf_params(true);
        assert_eq!(hash_coarse.volume.kind, VolumeKind::HashTsdf);
        assert_eq!(hash_coarse.volume.unit_resolution, 8);
        assert!(hash_coarse.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let params = Params::coarse_params();
        let yaml = params.to_yaml().unwrap();
        let parsed = Params::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.volume.resolution, params.volume.resolution);
        assert_eq!(parsed.tracking.icp_iterations, params.tracking.icp_iterations);
        assert_eq!(parsed.submap.visibility_metric, params.submap.visibility_metric);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
camera:
  frame_size: { width: 320, height: 240 }
tracking:
  pyramid_levels: 2
  icp_iterations: [6, 3]
volume:
  kind: tsdf
  resolution: [96, 96, 96]
"#;
        let params = Params::from_yaml(yaml).unwrap();
        assert_eq!(params.camera.frame_size.width, 320);
        assert_eq!(params.camera.depth_factor, 5000.0);
        assert_eq!(params.volume.kind, VolumeKind::Tsdf);
        assert_eq!(params.volume.unit_resolution, 16);
        assert_eq!(params.submap.overlap_frames, 10);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut params = Params::default();
        params.tracking.icp_iterations = vec![10, 5];
        assert!(matches!(params.validate(), Err(ConfigError::InvalidValue(_))));

        let mut params = Params::default();
        params.preprocess.bilateral_kernel_size = 6;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.submap.min_visibility_ratio = -0.1;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.volume.voxel_size = 0.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_deep_pyramid_rejected() {
        // Shifting by the level count must not overflow
        let mut params = Params::default();
        params.tracking.pyramid_levels = 70;
        params.tracking.icp_iterations = vec![1; 70];
        assert!(matches!(params.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_nan_values_rejected() {
        let mut params = Params::default();
        params.volume.voxel_size = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.volume.tsdf_trunc_dist = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.submap.min_visibility_ratio = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.tracking.icp_dist_thresh = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.camera.depth_factor = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.optimizer.initial_damping = f64::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "submap:\n  min_visibility_ratio: 0.35").unwrap();
        let params = Params::load(file.path()).unwrap();
        assert!((params.submap.min_visibility_ratio - 0.35).abs() < 1e-6);

        let missing = Params::load(Path::new("/nonexistent/fusion.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));

        assert!(matches!(
            Params::from_yaml("tracking: [not, a, map]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let params = Params::load_default().unwrap();
        params.validate().unwrap();
        assert_eq!(params.volume.kind, VolumeKind::HashTsdf);
        assert_eq!(params.tracking.icp_iterations, vec![10, 5, 4]);
    }
}
