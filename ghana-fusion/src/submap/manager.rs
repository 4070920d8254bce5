//! Submap manager - orchestrates submap lifecycle and the submap pose graph.

use std::collections::HashSet;

use log::{debug, info, warn};

use super::config::{SubmapConfig, VisibilityMetric};
use super::types::{Submap, SubmapId, SubmapState};
use crate::core::{FrameSize, Intrinsics, Pose};
use crate::graph::{GraphError, PoseGraph, default_information};
use crate::volume::VolumeParams;

/// Correction to apply to a submap's pose after pose graph optimization.
#[derive(Clone, Debug)]
pub struct SubmapCorrection {
    /// ID of the submap to correct.
    pub submap_id: SubmapId,
    /// New pose in world frame.
    pub new_pose: Pose,
}

/// Manages submaps and the pose graph linking them.
///
/// The SubmapManager handles:
/// - Submap lifecycle (Active → Overlapping → Retired)
/// - The transition decision from visibility statistics
/// - Graph nodes and transition/overlap edges
/// - Applying pose corrections from the optimizer
pub struct SubmapManager {
    /// All submaps in creation order.
    submaps: Vec<Submap>,

    /// Next submap ID to assign.
    next_id: u32,

    /// Index of the currently active submap.
    active_idx: Option<usize>,

    /// Configuration.
    config: SubmapConfig,

    /// Parameters for every new submap volume.
    volume_params: VolumeParams,

    /// One node per submap, edges between overlapping submaps.
    graph: PoseGraph,
}

impl SubmapManager {
    /// Create a new submap manager.
    pub fn new(config: SubmapConfig, volume_params: VolumeParams) -> Self {
        Self {
            submaps: Vec::new(),
            next_id: 0,
            active_idx: None,
            config,
            volume_params,
            graph: PoseGraph::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SubmapConfig {
        &self.config
    }

    /// Volume parameters used for new submaps.
    pub fn volume_params(&self) -> &VolumeParams {
        &self.volume_params
    }

    /// All submaps in creation order.
    pub fn submaps(&self) -> &[Submap] {
        &self.submaps
    }

    /// The active submap.
    pub fn active_submap(&self) -> Option<&Submap> {
        self.active_idx.map(|idx| &self.submaps[idx])
    }

    /// The active submap, mutably.
    pub fn active_submap_mut(&mut self) -> Option<&mut Submap> {
        self.active_idx.map(|idx| &mut self.submaps[idx])
    }

    /// Get a submap by ID.
    pub fn get_submap(&self, id: SubmapId) -> Option<&Submap> {
        self.submaps.iter().find(|s| s.id == id)
    }

    /// Get a mutable submap by ID.
    pub fn get_submap_mut(&mut self, id: SubmapId) -> Option<&mut Submap> {
        self.submaps.iter_mut().find(|s| s.id == id)
    }

    /// IDs of superseded submaps that are still tracked.
    pub fn overlapping_ids(&self) -> Vec<SubmapId> {
        self.submaps
            .iter()
            .filter(|s| s.state == SubmapState::Overlapping)
            .map(|s| s.id)
            .collect()
    }

    /// Number of submaps.
    pub fn submap_count(&self) -> usize {
        self.submaps.len()
    }

    /// The submap pose graph.
    pub fn graph(&self) -> &PoseGraph {
        &self.graph
    }

    /// Copy of the pose graph for optimization.
    pub fn snapshot_graph(&self) -> PoseGraph {
        self.graph.clone()
    }

    /// World camera pose tracked in the active submap.
    pub fn current_pose(&self) -> Option<Pose> {
        self.active_submap().map(Submap::world_camera_pose)
    }

    /// Total memory used by all submap volumes in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.submaps.iter().map(Submap::memory_bytes).sum()
    }

    /// Create the first submap at the given world pose.
    ///
    /// Returns the active submap's ID if one already exists.
    pub fn create_first(&mut self, world_pose: Pose, frame_id: u64) -> SubmapId {
        if let Some(active) = self.active_submap() {
            return active.id;
        }
        let id = self.push_submap(world_pose, frame_id);
        info!("Created first {} at frame {}", id, frame_id);
        id
    }

    /// Refresh the active submap's visibility statistics.
    ///
    /// `coverage` is the fraction of valid depth pixels that hit the active
    /// submap's raycast.
    pub fn update_visibility(
        &mut self,
        frame_id: u64,
        intrinsics: &Intrinsics,
        size: FrameSize,
        coverage: f32,
    ) {
        let window = self.config.visibility_window;
        let Some(active) = self.active_submap_mut() else {
            return;
        };
        let camera_pose = active.camera_pose;
        active.volume.mark_visible(&camera_pose, intrinsics, size, frame_id);
        active.visibility = active.volume.visibility_ratio(frame_id, window);
        active.coverage = coverage;
    }

    /// Overlap of the current view with the active submap, per the
    /// configured metric. 1.0 without an active submap.
    pub fn visibility_ratio(&self) -> f32 {
        self.active_submap().map_or(1.0, |s| match self.config.visibility_metric {
            VisibilityMetric::UnitVisibility => s.visibility,
            VisibilityMetric::RaycastCoverage => s.coverage,
        })
    }

    /// Should the camera move on to a fresh submap?
    pub fn should_create_submap(&self, frame_id: u64) -> bool {
        let Some(active) = self.active_submap() else {
            return false;
        };
        active.age(frame_id) >= self.config.min_frames_between_submaps
            && self.visibility_ratio() < self.config.min_visibility_ratio
    }

    /// Start a new submap at the current camera pose.
    ///
    /// The old active submap starts overlapping (or retires when overlap
    /// tracking is disabled) and a transition edge old → new is added.
    pub fn create_submap(&mut self, frame_id: u64) -> Option<SubmapId> {
        let old_idx = self.active_idx?;
        let overlap_frames = self.config.overlap_frames;

        let old = &mut self.submaps[old_idx];
        let old_id = old.id;
        let world_pose = old.world_camera_pose();
        // New submap frame is the camera at the transition
        let relative = old.camera_pose;
        if overlap_frames > 0 {
            old.start_overlapping(frame_id);
        } else {
            old.retire();
        }

        let new_id = self.push_submap(world_pose, frame_id);
        if let Err(e) = self
            .graph
            .add_edge(old_id, new_id, relative, default_information())
        {
            warn!("Failed to link {} to {}: {}", old_id, new_id, e);
        }

        info!(
            "Created {} at frame {} ({} submaps, {:.1} MB)",
            new_id,
            frame_id,
            self.submaps.len(),
            self.memory_bytes() as f64 / (1024.0 * 1024.0)
        );
        Some(new_id)
    }

    /// Average a relative pose `T_from⁻¹ · T_to` observed while tracking
    /// both submaps into their edge.
    pub fn add_overlap_observation(
        &mut self,
        from: SubmapId,
        to: SubmapId,
        relative: &Pose,
    ) -> Result<(), GraphError> {
        self.graph.add_observation(from, to, relative)
    }

    /// Retire overlapping submaps tracked for `overlap_frames` frames.
    ///
    /// Returns the IDs of submaps retired by this call.
    pub fn advance_overlaps(&mut self, frame_id: u64) -> Vec<SubmapId> {
        let overlap_frames = self.config.overlap_frames;
        let mut retired = Vec::new();
        for submap in &mut self.submaps {
            if submap.state != SubmapState::Overlapping {
                continue;
            }
            let started = submap.overlap_started_at.unwrap_or(frame_id);
            if frame_id.saturating_sub(started) >= overlap_frames {
                submap.retire();
                retired.push(submap.id);
            }
        }
        for id in &retired {
            debug!("Retired {} at frame {}", id, frame_id);
        }
        retired
    }

    /// Apply pose corrections from the optimizer.
    ///
    /// Submaps without a correction (created after the optimized snapshot)
    /// move rigidly with the newest corrected submap.
    pub fn apply_corrections(&mut self, corrections: &[SubmapCorrection]) {
        let mut covered = HashSet::new();
        // (creation index, world-frame delta) of the newest corrected submap
        let mut newest: Option<(usize, Pose)> = None;

        for correction in corrections {
            let Some(idx) = self
                .submaps
                .iter()
                .position(|s| s.id == correction.submap_id)
            else {
                continue;
            };
            let submap = &mut self.submaps[idx];
            let delta = correction.new_pose * submap.pose.inverse();
            submap.pose = correction.new_pose;
            covered.insert(submap.id);
            if newest.is_none_or(|(i, _)| idx > i) {
                newest = Some((idx, delta));
            }
        }

        if let Some((_, delta)) = newest {
            for submap in self.submaps.iter_mut().filter(|s| !covered.contains(&s.id)) {
                submap.pose = delta * submap.pose;
            }
        }

        for submap in &self.submaps {
            self.graph.add_node(submap.id, submap.pose);
        }
    }

    /// Clear all submaps and reset state.
    pub fn clear(&mut self) {
        self.submaps.clear();
        self.next_id = 0;
        self.active_idx = None;
        self.graph.clear();
    }

    /// Create an active submap and its graph node.
    fn push_submap(&mut self, world_pose: Pose, frame_id: u64) -> SubmapId {
        let id = SubmapId::new(self.next_id);
        self.next_id += 1;

        self.submaps
            .push(Submap::new(id, world_pose, &self.volume_params, frame_id));
        self.active_idx = Some(self.submaps.len() - 1);
        self.graph.add_node(id, world_pose);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Image;
    use crate::volume::VolumeKind;
    use approx::assert_relative_eq;

    fn manager(config: SubmapConfig) -> SubmapManager {
        SubmapManager::new(config, VolumeParams::coarse_params(VolumeKind::HashTsdf))
    }

    #[test]
    fn test_manager_creation() {
        let manager = manager(SubmapConfig::default());
        assert_eq!(manager.submap_count(), 0);
        assert!(manager.active_submap().is_none());
        assert!(manager.current_pose().is_none());
        assert!(!manager.should_create_submap(100));
    }

    #[test]
    fn test_create_first_is_idempotent() {
        let mut manager = manager(SubmapConfig::default());
        let a = manager.create_first(Pose::identity(), 0);
        let b = manager.create_first(Pose::translation(1.0, 0.0, 0.0), 3);
        assert_eq!(a, b);
        assert_eq!(manager.submap_count(), 1);
        assert!(manager.graph().get_node(a).unwrap().fixed);
    }

    #[test]
    fn test_transition_adds_edge_and_overlap() {
        let mut manager = manager(SubmapConfig::default());
        let first = manager.create_first(Pose::identity(), 0);
        let moved = Pose::translation(0.5, 0.0, 0.2);
        manager.active_submap_mut().unwrap().camera_pose = moved;

        let second = manager.create_submap(20).unwrap();
        assert_eq!(manager.submap_count(), 2);
        assert_eq!(manager.active_submap().unwrap().id, second);
        assert_eq!(manager.get_submap(first).unwrap().state, SubmapState::Overlapping);

        // New submap sits where the camera was; camera restarts at its origin
        let new = manager.get_submap(second).unwrap();
        assert_relative_eq!(new.pose.translation.vector, moved.translation.vector, epsilon = 1e-6);
        assert_eq!(new.camera_pose, Pose::identity());
        let pose = manager.current_pose().unwrap();
        assert_relative_eq!(pose.translation.vector, moved.translation.vector, epsilon = 1e-6);

        let edge = manager.graph().edge_between(first, second).unwrap();
        assert_relative_eq!(edge.measurement.translation.vector, moved.translation.vector, epsilon = 1e-6);
        assert!(manager.graph().chi_squared() < 1e-6);
    }

    #[test]
    fn test_overlaps_retire_after_window() {
        let mut manager = manager(SubmapConfig {
            overlap_frames: 3,
            ..Default::default()
        });
        let first = manager.create_first(Pose::identity(), 0);
        manager.create_submap(10);

        assert!(manager.advance_overlaps(11).is_empty());
        assert_eq!(manager.overlapping_ids(), vec![first]);
        assert_eq!(manager.advance_overlaps(13), vec![first]);
        assert_eq!(manager.get_submap(first).unwrap().state, SubmapState::Retired);
        assert!(manager.overlapping_ids().is_empty());
    }

    #[test]
    fn test_no_overlap_retires_immediately() {
        let mut manager = manager(SubmapConfig {
            overlap_frames: 0,
            ..Default::default()
        });
        let first = manager.create_first(Pose::identity(), 0);
        manager.create_submap(10);
        assert_eq!(manager.get_submap(first).unwrap().state, SubmapState::Retired);
    }

    #[test]
    fn test_should_create_requires_low_visibility_and_age() {
        let config = SubmapConfig {
            visibility_metric: VisibilityMetric::RaycastCoverage,
            min_frames_between_submaps: 5,
            ..Default::default()
        };
        let mut manager = manager(config);
        manager.create_first(Pose::identity(), 0);

        let size = crate::core::FrameSize::new(16, 12);
        let intr = Intrinsics::centered(size, 16.0);
        manager.update_visibility(2, &intr, size, 0.05);
        // Too young
        assert!(!manager.should_create_submap(2));
        assert!(manager.should_create_submap(6));

        manager.update_visibility(7, &intr, size, 0.9);
        assert!(!manager.should_create_submap(7));
    }

    #[test]
    fn test_unit_visibility_of_empty_volume_is_full() {
        let mut manager = manager(SubmapConfig::default());
        manager.create_first(Pose::identity(), 0);
        let size = crate::core::FrameSize::new(16, 12);
        let intr = Intrinsics::centered(size, 16.0);
        manager.update_visibility(50, &intr, size, 0.0);
        assert_eq!(manager.visibility_ratio(), 1.0);
        assert!(!manager.should_create_submap(50));
    }

    #[test]
    fn test_unit_visibility_drops_when_looking_away() {
        let mut manager = manager(SubmapConfig::default());
        manager.create_first(Pose::identity(), 0);
        let size = crate::core::FrameSize::new(32, 24);
        let intr = Intrinsics::centered(size, 30.0);
        let depth = Image::filled(size.width, size.height, 1.0f32);
        manager.active_submap_mut().unwrap().integrate(&depth, &intr);
        manager.update_visibility(0, &intr, size, 1.0);
        assert!(manager.visibility_ratio() > 0.5);

        // Turn around: nothing allocated is in view any more
        manager.active_submap_mut().unwrap().camera_pose =
            Pose::new(nalgebra::Vector3::zeros(), nalgebra::Vector3::new(0.0, std::f32::consts::PI, 0.0));
        manager.update_visibility(20, &intr, size, 0.0);
        assert!(manager.visibility_ratio() < 0.05);
        assert!(manager.should_create_submap(20));
    }

    #[test]
    fn test_overlap_observation_refines_edge() {
        let mut manager = manager(SubmapConfig::default());
        let first = manager.create_first(Pose::identity(), 0);
        manager.active_submap_mut().unwrap().camera_pose = Pose::translation(1.0, 0.0, 0.0);
        let second = manager.create_submap(10).unwrap();

        manager
            .add_overlap_observation(first, second, &Pose::translation(1.1, 0.0, 0.0))
            .unwrap();
        let edge = manager.graph().edge_between(first, second).unwrap();
        assert_eq!(edge.observations, 2);
        assert_relative_eq!(edge.measurement.translation.vector.x, 1.05, epsilon = 1e-5);
    }

    #[test]
    fn test_apply_corrections_moves_uncovered_rigidly() {
        let mut manager = manager(SubmapConfig::default());
        let first = manager.create_first(Pose::identity(), 0);
        manager.active_submap_mut().unwrap().camera_pose = Pose::translation(1.0, 0.0, 0.0);
        let second = manager.create_submap(10).unwrap();
        manager.active_submap_mut().unwrap().camera_pose = Pose::translation(1.0, 0.0, 0.0);
        let third = manager.create_submap(20).unwrap();

        // Snapshot covered only the first two submaps
        let corrections = vec![
            SubmapCorrection {
                submap_id: first,
                new_pose: Pose::identity(),
            },
            SubmapCorrection {
                submap_id: second,
                new_pose: Pose::translation(1.0, 0.5, 0.0),
            },
        ];
        manager.apply_corrections(&corrections);

        let p3 = manager.get_submap(third).unwrap().pose;
        assert_relative_eq!(p3.translation.vector.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p3.translation.vector.y, 0.5, epsilon = 1e-5);
        let node = manager.graph().get_node(third).unwrap();
        assert_relative_eq!(node.pose.translation.vector.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_clear() {
        let mut manager = manager(SubmapConfig::default());
        manager.create_first(Pose::identity(), 0);
        manager.create_submap(10);
        manager.clear();
        assert_eq!(manager.submap_count(), 0);
        assert_eq!(manager.graph().num_nodes(), 0);
        assert_eq!(manager.create_first(Pose::identity(), 0), SubmapId::new(0));
    }
}
