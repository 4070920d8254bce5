//! Core submap data types.

use crate::core::{DepthFrame, FrameSize, Intrinsics, Pose};
use crate::volume::{RaycastResult, Volume, VolumeParams};

/// Unique identifier for a submap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmapId(pub u32);

impl SubmapId {
    /// Create a new submap ID.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the numeric value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SubmapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Submap({})", self.0)
    }
}

/// State of a submap in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmapState {
    /// Receiving depth frames.
    /// Only one submap is Active at a time.
    Active,

    /// Superseded by a newer submap but still tracked, refining the
    /// constraint to its successor.
    Overlapping,

    /// No longer tracked or integrated.
    /// Its pose can still be adjusted by the pose graph optimizer.
    Retired,
}

impl SubmapState {
    /// Does this submap fuse new frames?
    #[inline]
    pub fn accepts_frames(&self) -> bool {
        matches!(self, SubmapState::Active)
    }

    /// Is the camera tracked against this submap?
    #[inline]
    pub fn is_tracked(&self) -> bool {
        matches!(self, SubmapState::Active | SubmapState::Overlapping)
    }
}

/// A locally consistent TSDF fragment with an adjustable world pose.
///
/// Everything inside the submap (volume, camera pose) is expressed in the
/// submap frame, so pose graph corrections only touch `pose`.
#[derive(Clone, Debug)]
pub struct Submap {
    /// Unique identifier.
    pub id: SubmapId,

    /// Pose of the submap frame in the world.
    /// This is what gets adjusted during pose graph optimization.
    pub pose: Pose,

    /// Current lifecycle state.
    pub state: SubmapState,

    /// Fused geometry.
    pub volume: Volume,

    /// Frame index at which the submap was created.
    pub created_at_frame: u64,

    /// Last tracked camera pose in the submap frame.
    pub camera_pose: Pose,

    /// Camera pose (submap frame) of the most recent integration.
    pub last_integrated_pose: Option<Pose>,

    /// Number of frames fused into the volume.
    pub integrated_frames: u64,

    /// Frame index at which the submap started overlapping.
    pub overlap_started_at: Option<u64>,

    /// Fraction of allocated units visible within the visibility window.
    pub visibility: f32,

    /// Fraction of valid depth pixels with a raycast hit in this submap.
    pub coverage: f32,
}

impl Submap {
    /// Create a new active submap at the given world pose.
    ///
    /// The camera starts at the submap origin.
    pub fn new(id: SubmapId, pose: Pose, volume_params: &VolumeParams, frame_id: u64) -> Self {
        Self {
            id,
            pose,
            state: SubmapState::Active,
            volume: Volume::new(volume_params),
            created_at_frame: frame_id,
            camera_pose: Pose::identity(),
            last_integrated_pose: None,
            integrated_frames: 0,
            overlap_started_at: None,
            visibility: 1.0,
            coverage: 1.0,
        }
    }

    /// Camera pose in the world frame.
    #[inline]
    pub fn world_camera_pose(&self) -> Pose {
        self.pose * self.camera_pose
    }

    /// Express a world camera pose in this submap's frame.
    #[inline]
    pub fn to_local(&self, world_pose: &Pose) -> Pose {
        self.pose.inverse() * world_pose
    }

    /// Fuse a depth frame at the current camera pose.
    pub fn integrate(&mut self, depth: &DepthFrame, intrinsics: &Intrinsics) {
        self.volume.integrate(depth, &self.camera_pose, intrinsics);
        self.last_integrated_pose = Some(self.camera_pose);
        self.integrated_frames += 1;
    }

    /// Raycast the volume from the current camera pose.
    pub fn raycast(&self, intrinsics: &Intrinsics, size: FrameSize) -> RaycastResult {
        self.volume.raycast(&self.camera_pose, intrinsics, size)
    }

    /// Start overlap tracking after being superseded.
    pub fn start_overlapping(&mut self, frame_id: u64) {
        self.state = SubmapState::Overlapping;
        self.overlap_started_at = Some(frame_id);
    }

    /// Stop tracking this submap.
    pub fn retire(&mut self) {
        self.state = SubmapState::Retired;
    }

    /// Frames elapsed since creation.
    #[inline]
    pub fn age(&self, frame_id: u64) -> u64 {
        frame_id.saturating_sub(self.created_at_frame)
    }

    /// Approximate memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.volume.memory_bytes()
    }
}
