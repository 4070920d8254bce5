//! Large-scale depth fusion pipeline.
//!
//! ```text
//! depth ─► truncate ─► filter ─► pyramid ─► ICP vs. raycast ─► integrate
//!                                                 │
//!                     overlap tracking ◄──────────┤
//!                                                 ▼
//!                                  visibility ─► new submap? ─► optimize?
//! ```
//!
//! State machine:
//!
//! ```text
//! Uninitialized ──first frame──► Tracking ⇄ Optimizing (background solve)
//!       ▲                            │
//!       └──────────reset()───────────┘
//! ```

use log::{debug, info, warn};
use nalgebra::{Point3, Vector3};

use crate::config::Params;
use crate::core::pose::motion_magnitude;
use crate::core::{
    DepthFilter, DepthFrame, FramePyramid, Image, Intrinsics, Pose, is_valid_depth, is_valid_point,
    is_valid_vec, nan_vector,
};
use crate::error::{FusionError, Result};
use crate::graph::{BackgroundOptimizer, GraphOptimizer, OptimizationOutcome, OptimizationResult};
use crate::render::{BACKGROUND, RgbaImage, render_phong};
use crate::submap::{Submap, SubmapId, SubmapManager};
use crate::tracking::{IcpTracker, TrackingError};
use crate::volume::RaycastResult;

/// Pipeline state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KinfuState {
    /// No frame fused yet.
    Uninitialized,
    /// Tracking and fusing frames.
    Tracking,
    /// Tracking while a background pose graph solve is in flight.
    Optimizing,
}

/// Outcome of one `update()` call.
#[derive(Clone, Debug)]
pub struct FrameStatus {
    /// Index of the frame (0 for the first frame after construction/reset).
    pub frame_id: u64,
    /// The camera was localized against the active submap.
    pub tracked: bool,
    /// The frame was fused into a volume.
    pub integrated: bool,
    /// Submap created by this frame.
    pub new_submap: Option<SubmapId>,
    /// Optimized submap poses were committed during this frame.
    pub optimized: bool,
    /// Overlap of the view with the active submap after this frame.
    pub visibility: f32,
    /// Why tracking failed, when it did.
    pub tracking_error: Option<TrackingError>,
}

impl FrameStatus {
    fn new(frame_id: u64) -> Self {
        Self {
            frame_id,
            tracked: false,
            integrated: false,
            new_submap: None,
            optimized: false,
            visibility: 1.0,
            tracking_error: None,
        }
    }
}

/// Surface points with normals in the world frame.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    /// Surface points
    pub points: Vec<Point3<f32>>,
    /// Unit normals, one per point
    pub normals: Vec<Vector3<f32>>,
}

impl PointCloud {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Large-scale KinectFusion: ICP tracking against TSDF submaps linked by an
/// optimized pose graph.
pub struct LargeKinfu {
    params: Params,
    filter: Box<dyn DepthFilter>,
    tracker: IcpTracker,
    optimizer: GraphOptimizer,
    background: Option<BackgroundOptimizer>,
    submaps: SubmapManager,
    frame_count: u64,
    submaps_since_optimization: usize,
    divergences: usize,
}

impl LargeKinfu {
    /// Create a pipeline with the bilateral depth filter from `params`.
    pub fn new(params: Params) -> Result<Self> {
        let filter = Box::new(params.preprocess.to_bilateral_filter());
        Self::with_filter(params, filter)
    }

    /// Create a pipeline with a custom depth filter.
    pub fn with_filter(params: Params, filter: Box<dyn DepthFilter>) -> Result<Self> {
        params.validate()?;
        info!(
            "LargeKinfu: {} frames, {:?} volume, voxel {:.4}m, {} pyramid levels",
            params.camera.frame_size,
            params.volume.kind,
            params.volume.voxel_size,
            params.tracking.pyramid_levels
        );

        Ok(Self {
            tracker: IcpTracker::new(params.tracking.to_icp_config()),
            optimizer: GraphOptimizer::new(params.optimizer.clone()),
            background: Self::spawn_background(&params),
            submaps: SubmapManager::new(params.submap.clone(), params.volume.clone()),
            filter,
            params,
            frame_count: 0,
            submaps_since_optimization: 0,
            divergences: 0,
        })
    }

    fn spawn_background(params: &Params) -> Option<BackgroundOptimizer> {
        params
            .optimizer
            .background
            .then(|| BackgroundOptimizer::new(params.optimizer.clone()))
    }

    /// Process one depth frame.
    ///
    /// Fails only on a frame of the wrong size. Tracking loss is reported
    /// in the returned status and leaves the pose unchanged.
    pub fn update(&mut self, depth: &DepthFrame) -> Result<FrameStatus> {
        let expected = self.params.camera.frame_size;
        if depth.size() != expected {
            return Err(FusionError::FrameSizeMismatch {
                expected,
                actual: depth.size(),
            });
        }

        let frame_id = self.frame_count;
        self.frame_count += 1;
        let mut status = FrameStatus::new(frame_id);
        status.optimized = self.poll_background();

        let mut raw = depth.clone();
        raw.truncate(self.params.preprocess.truncate_threshold);
        let filtered = self.filter.filter(&raw);
        let pyramid = FramePyramid::from_depth(
            &filtered,
            &self.params.camera.intrinsics,
            self.params.tracking.pyramid_levels,
            self.params.preprocess.bilateral_sigma_depth,
        );

        if self.submaps.active_submap().is_none() {
            let id = self.submaps.create_first(Pose::identity(), frame_id);
            self.integrate_active(&raw);
            self.submaps.update_visibility(
                frame_id,
                &self.params.camera.intrinsics,
                expected,
                1.0,
            );
            status.tracked = true;
            status.integrated = true;
            status.new_submap = Some(id);
            status.visibility = self.submaps.visibility_ratio();
            return Ok(status);
        }

        match self.track_active(&pyramid, &raw) {
            Ok(coverage) => {
                status.tracked = true;
                status.integrated = self.maybe_integrate(&raw);
                self.submaps.update_visibility(
                    frame_id,
                    &self.params.camera.intrinsics,
                    expected,
                    coverage,
                );
                self.track_overlaps(&pyramid);
                self.submaps.advance_overlaps(frame_id);

                if self.submaps.should_create_submap(frame_id) {
                    status.new_submap = self.transition(frame_id, &raw);
                    status.integrated |= status.new_submap.is_some();
                }
            }
            Err(e) => {
                warn!("Frame {}: tracking lost ({}), keeping previous pose", frame_id, e);
                status.tracking_error = Some(e);
            }
        }
        status.visibility = self.submaps.visibility_ratio();

        if self.optimization_due(frame_id) {
            status.optimized |= self.run_optimization();
        }

        debug!(
            "Frame {}: tracked={} integrated={} visibility={:.2} submaps={}",
            frame_id,
            status.tracked,
            status.integrated,
            status.visibility,
            self.submaps.submap_count()
        );
        Ok(status)
    }

    /// Process one frame of raw 16-bit sensor depth.
    ///
    /// Samples are scaled to meters with the configured `depth_factor`. The
    /// buffer is row-major and must hold exactly one sample per pixel.
    pub fn update_raw(&mut self, raw: &[u16]) -> Result<FrameStatus> {
        let size = self.params.camera.frame_size;
        let depth =
            DepthFrame::from_raw_u16(size.width, size.height, raw, self.params.camera.depth_factor)?;
        self.update(&depth)
    }

    /// Process one frame of raw float sensor depth, scaled like [`Self::update_raw`].
    pub fn update_raw_f32(&mut self, raw: &[f32]) -> Result<FrameStatus> {
        let size = self.params.camera.frame_size;
        let depth =
            DepthFrame::from_raw_f32(size.width, size.height, raw, self.params.camera.depth_factor)?;
        self.update(&depth)
    }

    /// Align the frame to the active submap and update its camera pose.
    ///
    /// Returns the fraction of valid depth pixels covered by the reference
    /// raycast.
    fn track_active(
        &mut self,
        pyramid: &FramePyramid,
        depth: &DepthFrame,
    ) -> std::result::Result<f32, TrackingError> {
        let intr = self.params.camera.intrinsics;
        let levels = self.params.tracking.pyramid_levels;
        let size = self.params.camera.frame_size;
        let active = self.submaps.active_submap().ok_or(TrackingError::EmptyReference)?;

        let raycast = active.raycast(&intr, size);
        let coverage = raycast_coverage(&raycast, depth);
        let reference = FramePyramid::from_points_normals(raycast.points, raycast.normals, levels);
        let result = self.tracker.track(pyramid, &reference, &intr, &Pose::identity())?;

        if let Some(active) = self.submaps.active_submap_mut() {
            active.camera_pose *= result.transform;
        }
        Ok(coverage)
    }

    /// Integrate when the camera moved enough since the last integration.
    fn maybe_integrate(&mut self, depth: &DepthFrame) -> bool {
        let min_movement = self.params.tracking.tsdf_min_camera_movement;
        let Some(active) = self.submaps.active_submap() else {
            return false;
        };
        let moved_enough = match active.last_integrated_pose {
            Some(last) => motion_magnitude(&(last.inverse() * active.camera_pose)) >= min_movement,
            None => true,
        };
        if moved_enough {
            self.integrate_active(depth);
        }
        moved_enough
    }

    fn integrate_active(&mut self, depth: &DepthFrame) {
        let intr = self.params.camera.intrinsics;
        if let Some(active) = self.submaps.active_submap_mut() {
            active.integrate(depth, &intr);
        }
    }

    /// Keep tracking superseded submaps and refine their edges to the
    /// active one.
    fn track_overlaps(&mut self, pyramid: &FramePyramid) {
        let Some(active) = self.submaps.active_submap() else {
            return;
        };
        let active_id = active.id;
        let active_camera = active.camera_pose;
        let world_camera = active.world_camera_pose();
        let intr = self.params.camera.intrinsics;
        let size = self.params.camera.frame_size;
        let levels = self.params.tracking.pyramid_levels;

        for id in self.submaps.overlapping_ids() {
            let Some(submap) = self.submaps.get_submap(id) else {
                continue;
            };
            let previous = submap.camera_pose;
            let predicted = submap.to_local(&world_camera);
            let raycast = submap.raycast(&intr, size);
            let reference = FramePyramid::from_points_normals(raycast.points, raycast.normals, levels);

            let initial = previous.inverse() * predicted;
            let camera_pose = match self.tracker.track(pyramid, &reference, &intr, &initial) {
                Ok(result) => {
                    let camera_pose = previous * result.transform;
                    // Active submap frame seen from this submap
                    let relative = camera_pose * active_camera.inverse();
                    if let Err(e) = self.submaps.add_overlap_observation(id, active_id, &relative) {
                        warn!("Dropping overlap observation {} -> {}: {}", id, active_id, e);
                    }
                    camera_pose
                }
                Err(e) => {
                    debug!("Overlap tracking against {} failed: {}", id, e);
                    predicted
                }
            };
            if let Some(submap) = self.submaps.get_submap_mut(id) {
                submap.camera_pose = camera_pose;
            }
        }
    }

    /// Switch to a new submap and fuse the current frame into it.
    fn transition(&mut self, frame_id: u64, depth: &DepthFrame) -> Option<SubmapId> {
        let visibility = self.submaps.visibility_ratio();
        let id = self.submaps.create_submap(frame_id)?;
        info!("Frame {}: visibility {:.2}, switched to {}", frame_id, visibility, id);

        self.integrate_active(depth);
        self.submaps.update_visibility(
            frame_id,
            &self.params.camera.intrinsics,
            self.params.camera.frame_size,
            1.0,
        );
        self.submaps_since_optimization += 1;
        Some(id)
    }

    fn optimization_due(&self, frame_id: u64) -> bool {
        let config = &self.params.optimizer;
        let by_submaps = config.optimize_every_n_submaps > 0
            && self.submaps_since_optimization >= config.optimize_every_n_submaps;
        let by_frames = config.optimize_every_n_frames > 0
            && frame_id > 0
            && frame_id % config.optimize_every_n_frames == 0;
        (by_submaps || by_frames) && self.submaps.graph().num_edges() > 0
    }

    /// Optimize inline or hand a snapshot to the worker.
    ///
    /// Returns whether new poses were committed now.
    fn run_optimization(&mut self) -> bool {
        let snapshot = self.submaps.snapshot_graph();
        if let Some(background) = self.background.as_mut() {
            if background.submit(snapshot) {
                debug!("Submitted pose graph snapshot to background optimizer");
                self.submaps_since_optimization = 0;
            }
            return false;
        }
        self.submaps_since_optimization = 0;
        let outcome = self.optimizer.optimize(&snapshot);
        self.commit(outcome)
    }

    /// Commit a finished background solve, if any.
    fn poll_background(&mut self) -> bool {
        match self.background.as_mut().and_then(BackgroundOptimizer::try_receive) {
            Some(outcome) => self.commit(outcome),
            None => false,
        }
    }

    fn commit(&mut self, outcome: OptimizationOutcome) -> bool {
        match outcome {
            Ok(result) => {
                self.submaps.apply_corrections(&result.corrections());
                info!(
                    "Pose graph optimized: {} iterations, chi² {:.3e} -> {:.3e} ({:?})",
                    result.iterations, result.initial_error, result.final_error, result.termination_reason
                );
                true
            }
            Err(e) => {
                self.divergences += 1;
                warn!("Pose graph optimization discarded: {}", e);
                false
            }
        }
    }

    /// Run a synchronous optimization now and commit it.
    ///
    /// Waits for an in-flight background solve first. On divergence the
    /// previous poses are kept and the error is returned.
    pub fn optimize_pose_graph(&mut self) -> Result<OptimizationResult> {
        if let Some(outcome) = self.background.as_mut().and_then(BackgroundOptimizer::wait) {
            self.commit(outcome);
        }
        self.submaps_since_optimization = 0;
        match self.optimizer.optimize(&self.submaps.snapshot_graph()) {
            Ok(result) => {
                self.submaps.apply_corrections(&result.corrections());
                Ok(result)
            }
            Err(e) => {
                self.divergences += 1;
                warn!("Pose graph optimization discarded: {}", e);
                Err(e.into())
            }
        }
    }

    /// Render the active submap from the current pose.
    pub fn render(&self) -> RgbaImage {
        self.render_from(&self.get_pose())
    }

    /// Render the active submap from an arbitrary world camera pose.
    pub fn render_from(&self, camera_pose: &Pose) -> RgbaImage {
        let size = self.params.camera.frame_size;
        let Some(active) = self.submaps.active_submap() else {
            return Image::filled(size.width, size.height, BACKGROUND);
        };
        let local = active.to_local(camera_pose);
        let raycast = active.volume.raycast(&local, &self.params.camera.intrinsics, size);
        let light = camera_pose.inverse() * Point3::from(self.params.render.light_pose);
        render_phong(&raycast.points, &raycast.normals, &light)
    }

    /// Surface points and normals of every submap, in the world frame.
    pub fn get_cloud(&self) -> PointCloud {
        let mut cloud = PointCloud::default();
        for submap in self.submaps.submaps() {
            let (points, normals) = submap.volume.fetch_points_normals();
            cloud.points.extend(points.iter().map(|p| submap.pose * p));
            cloud.normals.extend(normals.iter().map(|n| submap.pose.rotation * n));
        }
        cloud
    }

    /// Surface points of every submap, in the world frame.
    pub fn get_points(&self) -> Vec<Point3<f32>> {
        self.get_cloud().points
    }

    /// Surface normals at arbitrary world points.
    ///
    /// Looked up in the active submap first, then in creation order. NaN
    /// where no submap has data.
    pub fn get_normals(&self, points: &[Point3<f32>]) -> Vec<Vector3<f32>> {
        let mut normals = vec![nan_vector(); points.len()];
        let active_id = self.submaps.active_submap().map(|s| s.id);
        let search_order = self
            .submaps
            .active_submap()
            .into_iter()
            .chain(self.submaps.submaps().iter().filter(|s| Some(s.id) != active_id));

        for submap in search_order {
            let pending: Vec<usize> = (0..points.len()).filter(|&i| !is_valid_vec(&normals[i])).collect();
            if pending.is_empty() {
                break;
            }
            let to_local = submap.pose.inverse();
            let local: Vec<Point3<f32>> = pending.iter().map(|&i| to_local * points[i]).collect();
            for (&i, n) in pending.iter().zip(submap.volume.fetch_normals(&local)) {
                if is_valid_vec(&n) {
                    normals[i] = submap.pose.rotation * n;
                }
            }
        }
        normals
    }

    /// Current camera pose in the world frame (identity before the first frame).
    pub fn get_pose(&self) -> Pose {
        self.submaps.current_pose().unwrap_or_else(Pose::identity)
    }

    /// Drop all submaps and start over from the next frame.
    pub fn reset(&mut self) {
        // Replacing the worker joins the old one and discards its result
        self.background = Self::spawn_background(&self.params);
        self.submaps.clear();
        self.frame_count = 0;
        self.submaps_since_optimization = 0;
        self.divergences = 0;
        info!("LargeKinfu reset");
    }

    /// Pipeline state.
    pub fn state(&self) -> KinfuState {
        if self.submaps.submap_count() == 0 {
            KinfuState::Uninitialized
        } else if self.background.as_ref().is_some_and(BackgroundOptimizer::is_busy) {
            KinfuState::Optimizing
        } else {
            KinfuState::Tracking
        }
    }

    /// Parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Camera intrinsics.
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.params.camera.intrinsics
    }

    /// All submaps in creation order.
    pub fn submaps(&self) -> &[Submap] {
        self.submaps.submaps()
    }

    /// The submap manager, including the pose graph.
    pub fn submap_manager(&self) -> &SubmapManager {
        &self.submaps
    }

    /// Frames passed to `update()` since construction or the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Optimizations discarded because they diverged.
    pub fn divergence_count(&self) -> usize {
        self.divergences
    }
}

/// Fraction of valid depth pixels with a raycast hit at the same pixel.
fn raycast_coverage(raycast: &RaycastResult, depth: &DepthFrame) -> f32 {
    let mut valid = 0usize;
    let mut covered = 0usize;
    for (d, p) in depth.data().iter().zip(raycast.points.data()) {
        if is_valid_depth(*d) {
            valid += 1;
            if is_valid_point(p) {
                covered += 1;
            }
        }
    }
    if valid == 0 {
        1.0
    } else {
        covered as f32 / valid as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameSize, PassThrough};
    use crate::graph::GraphError;
    use crate::volume::{VolumeKind, VolumeParams};

    fn small_params() -> Params {
        let mut params = Params::hash_tsdf_params(true);
        params.camera.frame_size = FrameSize::new(64, 48);
        params.camera.intrinsics = Intrinsics::centered(params.camera.frame_size, 60.0);
        params.tracking.icp_min_correspondences = 30;
        params.volume = VolumeParams {
            voxel_size: 0.02,
            tsdf_trunc_dist: 0.06,
            unit_resolution: 8,
            ..VolumeParams::coarse_params(VolumeKind::HashTsdf)
        };
        params
    }

    fn wall(params: &Params, distance: f32) -> DepthFrame {
        let size = params.camera.frame_size;
        Image::filled(size.width, size.height, distance)
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let mut kinfu = LargeKinfu::new(small_params()).unwrap();
        let err = kinfu.update(&Image::filled(10, 10, 1.0f32)).unwrap_err();
        assert!(matches!(err, FusionError::FrameSizeMismatch { .. }));
        assert_eq!(kinfu.frame_count(), 0);
        assert_eq!(kinfu.state(), KinfuState::Uninitialized);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = small_params();
        params.tracking.pyramid_levels = 2;
        assert!(matches!(
            LargeKinfu::new(params),
            Err(FusionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_first_frame_initializes() {
        let params = small_params();
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();

        let status = kinfu.update(&depth).unwrap();
        assert_eq!(status.frame_id, 0);
        assert!(status.integrated);
        assert_eq!(status.new_submap, Some(SubmapId::new(0)));
        assert_eq!(kinfu.state(), KinfuState::Tracking);
        assert_eq!(kinfu.get_pose(), Pose::identity());
        assert!(!kinfu.get_points().is_empty());
    }

    #[test]
    fn test_empty_frame_loses_tracking_softly() {
        let params = small_params();
        let depth = wall(&params, 1.0);
        let empty = wall(&params, 0.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();

        let status = kinfu.update(&empty).unwrap();
        assert!(!status.tracked);
        assert!(!status.integrated);
        assert!(status.tracking_error.is_some());
        assert_eq!(kinfu.get_pose(), Pose::identity());
        assert_eq!(kinfu.frame_count(), 2);
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let params = small_params();
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();
        kinfu.update(&depth).unwrap();

        kinfu.reset();
        assert_eq!(kinfu.state(), KinfuState::Uninitialized);
        assert_eq!(kinfu.frame_count(), 0);
        assert!(kinfu.submaps().is_empty());
        assert!(kinfu.get_points().is_empty());

        let status = kinfu.update(&depth).unwrap();
        assert_eq!(status.frame_id, 0);
        assert_eq!(status.new_submap, Some(SubmapId::new(0)));
    }

    #[test]
    fn test_render_before_and_after_fusion() {
        let params = small_params();
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();

        let blank = kinfu.render();
        assert!(blank.data().iter().all(|px| *px == BACKGROUND));

        kinfu.update(&depth).unwrap();
        let image = kinfu.render();
        let lit = image.data().iter().filter(|px| px[3] == 255).count();
        assert!(lit > image.data().len() / 4);
    }

    #[test]
    fn test_normals_at_world_points() {
        let params = small_params();
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();

        let normals = kinfu.get_normals(&[Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, -5.0)]);
        assert!(normals[0].z < -0.9);
        assert!(!is_valid_vec(&normals[1]));
    }

    /// Fuse one raw frame of a constant wall and return the mean surface depth.
    fn fuse_raw_wall(depth_factor: f32, sample: u16) -> (usize, f32) {
        let mut params = small_params();
        params.camera.depth_factor = depth_factor;
        let raw = vec![sample; params.camera.frame_size.area()];
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        assert!(kinfu.update_raw(&raw).unwrap().integrated);

        let points = kinfu.get_points();
        let mean_z = points.iter().map(|p| p.z).sum::<f32>() / points.len().max(1) as f32;
        (points.len(), mean_z)
    }

    #[test]
    fn test_raw_depth_scaled_by_depth_factor() {
        // 1.2 m in two sensor conventions
        let (count_5000, z_5000) = fuse_raw_wall(5000.0, 6000);
        let (count_1000, z_1000) = fuse_raw_wall(1000.0, 1200);
        assert!(count_5000 > 0);
        assert_eq!(count_5000, count_1000);
        assert!((z_5000 - z_1000).abs() < 1e-4);
        assert!((z_5000 - 1.2).abs() < 0.05, "surface at z={}", z_5000);
    }

    #[test]
    fn test_raw_f32_depth() {
        let mut params = small_params();
        params.camera.depth_factor = 1000.0;
        let raw = vec![1200.0f32; params.camera.frame_size.area()];
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        assert!(kinfu.update_raw_f32(&raw).unwrap().integrated);

        let points = kinfu.get_points();
        assert!(!points.is_empty());
        assert!(points.iter().all(|p| (p.z - 1.2).abs() < 0.1));
    }

    #[test]
    fn test_raw_length_mismatch() {
        let mut kinfu = LargeKinfu::new(small_params()).unwrap();
        let err = kinfu.update_raw(&[5000u16; 10]).unwrap_err();
        assert!(matches!(
            err,
            FusionError::BufferLengthMismatch {
                expected: 3072,
                actual: 10
            }
        ));
        assert_eq!(kinfu.frame_count(), 0);
        assert_eq!(kinfu.state(), KinfuState::Uninitialized);
    }

    #[test]
    fn test_frame_trigger_schedules_optimization() {
        let mut params = small_params();
        params.optimizer.optimize_every_n_submaps = 0;
        params.optimizer.optimize_every_n_frames = 5;
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();

        // Nothing to optimize without an edge
        assert!(!kinfu.optimization_due(5));

        kinfu.submaps.create_submap(1).unwrap();
        assert!(kinfu.optimization_due(5));
        assert!(kinfu.optimization_due(10));
        assert!(!kinfu.optimization_due(0));
        assert!(!kinfu.optimization_due(4));
        assert!(!kinfu.optimization_due(6));
    }

    #[test]
    fn test_submap_trigger_ignores_frames_when_disabled() {
        let mut params = small_params();
        params.optimizer.optimize_every_n_submaps = 1;
        params.optimizer.optimize_every_n_frames = 0;
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();
        kinfu.submaps.create_submap(1).unwrap();

        assert!(!kinfu.optimization_due(5));
        kinfu.submaps_since_optimization = 1;
        assert!(kinfu.optimization_due(5));
    }

    #[test]
    fn test_state_optimizing_while_background_busy() {
        let mut params = small_params();
        params.optimizer.background = true;
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();
        kinfu.submaps.create_submap(1).unwrap();
        assert_eq!(kinfu.state(), KinfuState::Tracking);

        // Submitting returns before anything is committed
        assert!(!kinfu.run_optimization());
        assert_eq!(kinfu.state(), KinfuState::Optimizing);

        kinfu.optimize_pose_graph().unwrap();
        assert_eq!(kinfu.state(), KinfuState::Tracking);
        assert_eq!(kinfu.divergence_count(), 0);
    }

    #[test]
    fn test_diverged_optimization_discarded() {
        let params = small_params();
        let depth = wall(&params, 1.0);
        let mut kinfu = LargeKinfu::with_filter(params, Box::new(PassThrough)).unwrap();
        kinfu.update(&depth).unwrap();
        if let Some(active) = kinfu.submaps.active_submap_mut() {
            active.camera_pose = Pose::translation(0.1, 0.0, 0.0);
        }
        kinfu.submaps.create_submap(1).unwrap();

        let before: Vec<Pose> = kinfu.submaps().iter().map(|s| s.pose).collect();
        let committed = kinfu.commit(Err(GraphError::Diverged {
            initial_error: 1.0,
            final_error: 2.0,
        }));

        assert!(!committed);
        assert_eq!(kinfu.divergence_count(), 1);
        let after: Vec<Pose> = kinfu.submaps().iter().map(|s| s.pose).collect();
        assert_eq!(before, after);
        assert_eq!(after[1], Pose::translation(0.1, 0.0, 0.0));
    }
}
